use serde::Serialize;

/// Result of processing one unit of a batch (a document, worksheet, image, or chunk).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Ingested { units: usize },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub item: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

impl ItemReport {
    #[must_use]
    pub fn ingested(item: impl Into<String>, units: usize) -> Self {
        Self {
            item: item.into(),
            outcome: ItemOutcome::Ingested { units },
        }
    }

    #[must_use]
    pub fn skipped(item: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            item: item.into(),
            outcome: ItemOutcome::Skipped {
                reason: reason.to_string(),
            },
        }
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Skipped { .. })
    }
}

/// Per-item outcomes of one batch run, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub items: Vec<ItemReport>,
}

impl IngestReport {
    pub fn push(&mut self, item: ItemReport) {
        if let ItemOutcome::Skipped { reason } = &item.outcome {
            tracing::warn!(item = %item.item, %reason, "item skipped");
        }
        self.items.push(item);
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = ItemReport>) {
        for item in items {
            self.push(item);
        }
    }

    #[must_use]
    pub fn ingested_count(&self) -> usize {
        self.items.iter().filter(|i| !i.is_skipped()).count()
    }

    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.items.iter().filter(|i| i.is_skipped()).count()
    }

    /// Sum of `units` over ingested items.
    #[must_use]
    pub fn total_units(&self) -> usize {
        self.items
            .iter()
            .map(|i| match i.outcome {
                ItemOutcome::Ingested { units } => units,
                ItemOutcome::Skipped { .. } => 0,
            })
            .sum()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|i| i.is_skipped())
    }
}
