//! Backend Selection
//!
//! NdArray on the CPU by default, CUDA when the `cuda` feature is enabled.
//! Saliency needs gradients with respect to the input, so classifiers are
//! always held on the autodiff wrapper and `valid()` is used for plain
//! prediction.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(not(feature = "cuda"))]
pub type DefaultBackend = burn::backend::NdArray;

/// Backend classifiers are loaded on
pub type AnalysisBackend = Autodiff<DefaultBackend>;

/// Device type of the analysis backend
pub type AnalysisDevice = <AnalysisBackend as Backend>::Device;

/// Get the default device for the current backend
pub fn default_device() -> AnalysisDevice {
    AnalysisDevice::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(not(feature = "cuda"))]
    {
        "NdArray (CPU)"
    }
}
