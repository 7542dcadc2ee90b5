//! # Convolutional Denoiser
//!
//! A stack of 1-D convolutions run with candle. The weights come from a safetensors
//! file laid out as:
//!
//! ```text
//! layers.0.weight  [out_0, 1, k_0]
//! layers.0.bias    [out_0]            (optional)
//! layers.1.weight  [out_1, out_0, k_1]
//! ...
//! layers.N.weight  [1, out_{N-1}, k_N]
//! ```
//!
//! Every kernel width must be odd; layers use `k/2` padding so the output has exactly
//! as many samples as the input. `tanh` sits between layers, the last layer is linear.
//!
//! ## Thread Safety:
//! The layers are immutable after loading and `denoise` allocates its own tensors,
//! so one instance can serve many requests concurrently.

use crate::inference::Denoiser;
use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Conv1d, Conv1dConfig};
use std::collections::HashMap;
use std::path::Path;

pub struct ConvDenoiser {
    name: String,
    layers: Vec<Conv1d>,
    device: Device,
}

impl ConvDenoiser {
    /// Load weights from a safetensors file onto `device`.
    pub fn load(path: &Path, device: &Device) -> Result<Self> {
        let tensors = candle_core::safetensors::load(path, device)
            .with_context(|| format!("Failed to read model weights from {}", path.display()))?;

        let name = path
            .parent()
            .and_then(|dir| dir.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "conv-denoiser".to_string());

        Self::from_tensors(name, tensors, device)
    }

    /// Build the layer stack from named tensors.
    pub fn from_tensors(
        name: impl Into<String>,
        mut tensors: HashMap<String, Tensor>,
        device: &Device,
    ) -> Result<Self> {
        let mut layers = Vec::new();
        let mut in_channels = 1;

        while let Some(weight) = tensors.remove(&format!("layers.{}.weight", layers.len())) {
            let index = layers.len();
            let weight = weight.to_dtype(DType::F32)?.to_device(device)?;
            let (out_channels, layer_in, kernel) = weight
                .dims3()
                .with_context(|| format!("layers.{}.weight must be [out, in, kernel]", index))?;

            if layer_in != in_channels {
                return Err(anyhow!(
                    "layers.{} expects {} input channels but the previous layer produces {}",
                    index,
                    layer_in,
                    in_channels
                ));
            }
            if kernel % 2 == 0 {
                return Err(anyhow!("layers.{} has even kernel width {}", index, kernel));
            }

            let bias = match tensors.remove(&format!("layers.{}.bias", index)) {
                Some(bias) => {
                    let bias = bias.to_dtype(DType::F32)?.to_device(device)?;
                    if bias.dims() != [out_channels].as_slice() {
                        return Err(anyhow!(
                            "layers.{}.bias has shape {:?}, expected [{}]",
                            index,
                            bias.dims(),
                            out_channels
                        ));
                    }
                    Some(bias)
                }
                None => None,
            };

            let config = Conv1dConfig {
                padding: kernel / 2,
                ..Default::default()
            };
            layers.push(Conv1d::new(weight, bias, config));
            in_channels = out_channels;
        }

        if layers.is_empty() {
            return Err(anyhow!("Model file contains no layers.0.weight tensor"));
        }
        if in_channels != 1 {
            return Err(anyhow!(
                "Final layer must produce 1 channel, found {}",
                in_channels
            ));
        }
        if !tensors.is_empty() {
            let mut unused: Vec<_> = tensors.keys().cloned().collect();
            unused.sort();
            tracing::warn!(unused = ?unused, "Ignoring tensors that are not part of the layer stack");
        }

        Ok(Self {
            name: name.into(),
            layers,
            device: device.clone(),
        })
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

impl Denoiser for ConvDenoiser {
    fn name(&self) -> &str {
        &self.name
    }

    fn denoise(&self, signal: &[f32]) -> Result<Vec<f32>> {
        let mut x = Tensor::from_slice(signal, (1, 1, signal.len()), &self.device)?;

        let last = self.layers.len() - 1;
        for (index, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x)?;
            if index != last {
                x = x.tanh()?;
            }
        }

        Ok(x.flatten_all()?.to_vec1::<f32>()?)
    }
}
