use candle_core::Device;
use tracing::{debug, warn};

use super::error::EmbeddingError;

/// Picks the compute device for encoder and cross-encoder inference.
///
/// GPU backends are only attempted when the matching cargo feature is enabled.
/// `force_cpu` skips them entirely, which the n-gram encoder and tests rely on.
pub fn select_device(force_cpu: bool) -> Result<Device, EmbeddingError> {
    if force_cpu {
        debug!("CPU device requested explicitly");
        return Ok(Device::Cpu);
    }

    #[allow(unused_mut)]
    let mut failures: Vec<String> = Vec::new();

    #[cfg(feature = "metal")]
    match Device::new_metal(0) {
        Ok(device) => {
            tracing::info!("Encoder using Metal GPU");
            return Ok(device);
        }
        Err(e) => failures.push(format!("metal: {e}")),
    }

    #[cfg(feature = "cuda")]
    match Device::new_cuda(0) {
        Ok(device) => {
            tracing::info!("Encoder using CUDA GPU");
            return Ok(device);
        }
        Err(e) => failures.push(format!("cuda: {e}")),
    }

    if failures.is_empty() {
        debug!("No GPU backend compiled, using CPU");
    } else {
        warn!(reason = %failures.join("; "), "GPU unavailable, falling back to CPU");
    }
    Ok(Device::Cpu)
}

/// Human-readable device label for logs and health details.
pub fn device_label(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}
