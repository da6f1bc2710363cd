//! Local embedding backends running on candle.
//!
//! Both models load once, eagerly, into an owned value; clones share the
//! weights through `Arc`. Forward passes run on the blocking pool.

mod bert;
mod clip;
mod hub;

pub use bert::BertEmbedder;
pub use clip::ClipEmbedder;

use candle_core::Device;

use crate::error::LlmError;

/// Pick the compute device for the enabled accelerator feature, falling back to CPU.
///
/// # Errors
///
/// Returns an error if the accelerator is compiled in but cannot be initialized.
pub fn select_device() -> Result<Device, LlmError> {
    #[cfg(feature = "cuda")]
    {
        return Ok(Device::new_cuda(0)?);
    }
    #[cfg(all(feature = "metal", not(feature = "cuda")))]
    {
        return Ok(Device::new_metal(0)?);
    }
    #[allow(unreachable_code)]
    Ok(Device::Cpu)
}

async fn run_blocking<T, F>(f: F) -> Result<T, LlmError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, LlmError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LlmError::Inference(format!("embedding task failed: {e}")))?
}
