//! Pure-Rust all-MiniLM-L6-v2 inference (fallback for musl and Intel Mac).
//!
//! Loads the ONNX export with tract-onnx and tokenizes with the tokenizers
//! crate; no ONNX Runtime or system libraries. Weights are fetched from the
//! Hugging Face hub once and kept under `~/.cache/grounded-answers/models`.
#![cfg_attr(
    all(feature = "local-embeddings-fastembed", feature = "local-embeddings-tract"),
    allow(dead_code)
)]

use anyhow::{anyhow, bail, Context};
use std::path::{Path, PathBuf};
use tract_onnx::prelude::*;

use super::{MINILM_DIMS, MINILM_MODEL_ID};
use crate::error::{RagError, Result};

const ONNX_FILE: &str = "onnx/model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";
const MAX_TOKENS: usize = 256;

/// Embeds `texts` synchronously; the caller runs this on the blocking pool.
pub(super) fn embed_blocking(batch_size: usize, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    run(batch_size, texts).map_err(|e| RagError::Embedding(format!("{:#}", e)))
}

fn model_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let dir = PathBuf::from(home)
        .join(".cache")
        .join("grounded-answers")
        .join("models")
        .join("all-minilm-l6-v2");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Create model cache {}", dir.display()))?;
    Ok(dir)
}

fn fetch_once(file: &str, dest: &Path) -> anyhow::Result<()> {
    if dest.exists() {
        return Ok(());
    }
    let url = format!("https://huggingface.co/{}/resolve/main/{}", MINILM_MODEL_ID, file);
    tracing::info!("downloading {}", url);
    let bytes = reqwest::blocking::get(&url)
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.bytes())
        .with_context(|| format!("Download {}", url))?;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Write beside the target and rename so an interrupted download never
    // leaves a truncated model in the cache.
    let partial = dest.with_extension("part");
    std::fs::write(&partial, &bytes)?;
    std::fs::rename(&partial, dest)?;
    Ok(())
}

fn run(batch_size: usize, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
    let dir = model_dir()?;
    let onnx_path = dir.join(ONNX_FILE);
    let tokenizer_path = dir.join(TOKENIZER_FILE);
    fetch_once(ONNX_FILE, &onnx_path)?;
    fetch_once(TOKENIZER_FILE, &tokenizer_path)?;

    let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| anyhow!("Load tokenizer: {}", e))?;

    let model = tract_onnx::onnx()
        .model_for_path(&onnx_path)
        .context("Load ONNX")?
        .into_optimized()
        .context("Optimize")?
        .into_runnable()
        .context("Build tract runnable")?;

    let mut vectors = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size.max(1)) {
        let encodings = batch
            .iter()
            .map(|s| {
                tokenizer
                    .encode(s.as_str(), true)
                    .map_err(|e| anyhow!("Tokenize: {}", e))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let width = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(1)
            .clamp(1, MAX_TOKENS);
        let rows = encodings.len();

        let mut input_ids = vec![0i64; rows * width];
        let mut attention_mask = vec![0i64; rows * width];
        let mut token_type_ids = vec![0i64; rows * width];
        for (i, enc) in encodings.iter().enumerate() {
            for (j, &id) in enc.get_ids().iter().take(width).enumerate() {
                input_ids[i * width + j] = id as i64;
                attention_mask[i * width + j] = 1;
            }
            for (j, &t) in enc.get_type_ids().iter().take(width).enumerate() {
                token_type_ids[i * width + j] = t as i64;
            }
        }

        let ids: Tensor = ndarray::Array2::from_shape_vec((rows, width), input_ids)?.into();
        let mask: Tensor =
            ndarray::Array2::from_shape_vec((rows, width), attention_mask.clone())?.into();
        let types: Tensor = ndarray::Array2::from_shape_vec((rows, width), token_type_ids)?.into();

        let outputs = model.run(tvec!(ids.into(), mask.into(), types.into()))?;
        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("model produced no output"))?;
        let view = output.to_array_view::<f32>()?;

        match view.shape() {
            // Already pooled: [batch, dims].
            &[b, _] => {
                for i in 0..b {
                    let row: Vec<f32> = view.slice(ndarray::s![i, ..]).iter().copied().collect();
                    vectors.push(normalize_l2(row));
                }
            }
            // Token states: [batch, seq, dims]; mean-pool over unmasked tokens.
            &[b, seq, _] => {
                for i in 0..b {
                    let mut sum = vec![0f32; MINILM_DIMS];
                    let mut count = 0f32;
                    for j in 0..seq.min(width) {
                        if attention_mask[i * width + j] == 0 {
                            continue;
                        }
                        for (k, &v) in view.slice(ndarray::s![i, j, ..]).iter().enumerate() {
                            if k < MINILM_DIMS {
                                sum[k] += v;
                            }
                        }
                        count += 1.0;
                    }
                    if count > 0.0 {
                        sum.iter_mut().for_each(|x| *x /= count);
                    }
                    vectors.push(normalize_l2(sum));
                }
            }
            other => bail!("Unexpected output shape: {:?}", other),
        }
    }

    Ok(vectors)
}

fn normalize_l2(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-9 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}
