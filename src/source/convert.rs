//! Float16 conversion of safetensors weight files
//!
//! Floating point tensors (F64, F32, BF16) are rewritten as F16. Integer and
//! boolean tensors, and tensors already in F16, are copied unchanged. The
//! file-level `__metadata__` map is preserved.

use crate::error::{PackagerError, PackagerResult};
use half::{bf16, f16};
use safetensors::tensor::{Dtype, SafeTensors, TensorView};
use std::borrow::Cow;
use std::path::Path;

/// Summary of one converted file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionStats {
    pub tensors: usize,
    pub converted: usize,
    /// Total tensor payload in the output, in bytes
    pub output_bytes: u64,
}

/// Convert `src` to float16 and write the result to `dst`
///
/// `dst` is overwritten. `src` and `dst` may not be the same file.
pub fn convert_file_to_f16(src: &Path, dst: &Path) -> PackagerResult<ConversionStats> {
    let buffer = std::fs::read(src).map_err(|e| PackagerError::io(src, e))?;
    let conversion_err = |message: String| PackagerError::Conversion {
        path: src.to_path_buf(),
        message,
    };

    let (_, metadata) =
        SafeTensors::read_metadata(&buffer).map_err(|e| conversion_err(e.to_string()))?;
    let tensors =
        SafeTensors::deserialize(&buffer).map_err(|e| conversion_err(e.to_string()))?;

    let mut converted = 0;
    let mut owned: Vec<(String, Dtype, Vec<usize>, Cow<'_, [u8]>)> = Vec::new();
    for (name, view) in tensors.tensors() {
        let data = match to_f16_bytes(view.dtype(), view.data()) {
            Some(bytes) => {
                converted += 1;
                Cow::Owned(bytes)
            }
            None => Cow::Borrowed(view.data()),
        };
        let dtype = if matches!(data, Cow::Owned(_)) {
            Dtype::F16
        } else {
            view.dtype()
        };
        owned.push((name, dtype, view.shape().to_vec(), data));
    }

    let mut views = Vec::with_capacity(owned.len());
    let mut output_bytes = 0u64;
    for (name, dtype, shape, data) in &owned {
        output_bytes += data.len() as u64;
        let view = TensorView::new(*dtype, shape.clone(), data)
            .map_err(|e| conversion_err(format!("tensor '{}': {}", name, e)))?;
        views.push((name.as_str(), view));
    }

    safetensors::serialize_to_file(views, metadata.metadata(), dst)
        .map_err(|e| conversion_err(e.to_string()))?;

    Ok(ConversionStats {
        tensors: owned.len(),
        converted,
        output_bytes,
    })
}

/// Little-endian F16 bytes for a float tensor, `None` when left as-is
fn to_f16_bytes(dtype: Dtype, data: &[u8]) -> Option<Vec<u8>> {
    match dtype {
        Dtype::F32 => Some(
            data.chunks_exact(4)
                .flat_map(|c| {
                    f16::from_f32(f32::from_le_bytes([c[0], c[1], c[2], c[3]])).to_le_bytes()
                })
                .collect(),
        ),
        Dtype::F64 => Some(
            data.chunks_exact(8)
                .flat_map(|c| {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(c);
                    f16::from_f64(f64::from_le_bytes(raw)).to_le_bytes()
                })
                .collect(),
        ),
        Dtype::BF16 => Some(
            data.chunks_exact(2)
                .flat_map(|c| f16::from_f32(bf16::from_le_bytes([c[0], c[1]]).to_f32()).to_le_bytes())
                .collect(),
        ),
        _ => None,
    }
}
