//! BERT-family models loaded from a directory of `config.json` + `model.safetensors`.

use std::path::Path;
use std::sync::Arc;

use candle_core::{DType, Device, IndexOp, Result, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config};

fn read_config(model_dir: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(model_dir.join("config.json"))?;
    serde_json::from_str(&raw)
        .map_err(|e| candle_core::Error::Msg(format!("failed to parse config.json: {e}")))
}

fn var_builder(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let weights = model_dir.join("model.safetensors");
    // SAFETY: the weights file is opened read-only and outlives the builder's mmap.
    unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, device) }
}

/// Checkpoints prefix the encoder with `bert.` or `roberta.`, or not at all.
fn load_backbone(vb: &VarBuilder, config: &Config) -> Result<BertModel> {
    if vb.contains_tensor("bert.embeddings.word_embeddings.weight") {
        BertModel::load(vb.pp("bert"), config)
    } else if vb.contains_tensor("roberta.embeddings.word_embeddings.weight") {
        BertModel::load(vb.pp("roberta"), config)
    } else {
        BertModel::load(vb.clone(), config)
    }
}

struct CrossEncoderInner {
    bert: BertModel,
    classifier: Linear,
}

/// Sequence-pair classifier producing one raw relevance logit per pair.
#[derive(Clone)]
pub struct CrossEncoderModel(Arc<CrossEncoderInner>);

impl CrossEncoderModel {
    pub fn load(model_dir: &Path, device: &Device) -> Result<Self> {
        let config = read_config(model_dir)?;
        let vb = var_builder(model_dir, device)?;
        let bert = load_backbone(&vb, &config)?;
        let classifier = candle_nn::linear(config.hidden_size, 1, vb.pp("classifier"))?;
        Ok(Self(Arc::new(CrossEncoderInner { bert, classifier })))
    }

    /// Returns logits shaped `[batch, 1]`, taken from the `[CLS]` position.
    pub fn forward(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> Result<Tensor> {
        let hidden = self
            .0
            .bert
            .forward(input_ids, token_type_ids, Some(attention_mask))?;
        let cls = hidden.i((.., 0, ..))?;
        self.0.classifier.forward(&cls)
    }
}

/// Sentence encoder: BERT hidden states mean-pooled over the attention mask.
#[derive(Clone)]
pub struct PooledEncoderModel {
    bert: Arc<BertModel>,
    hidden_size: usize,
}

impl PooledEncoderModel {
    pub fn load(model_dir: &Path, device: &Device) -> Result<Self> {
        let config = read_config(model_dir)?;
        let vb = var_builder(model_dir, device)?;
        let bert = load_backbone(&vb, &config)?;
        Ok(Self {
            bert: Arc::new(bert),
            hidden_size: config.hidden_size,
        })
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Returns the pooled vector for a single sequence (`[1, seq]` inputs).
    pub fn embed(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> Result<Vec<f32>> {
        let hidden = self
            .bert
            .forward(input_ids, token_type_ids, Some(attention_mask))?;
        let mask = attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
        // Tokenizer output always attends to at least [CLS], so count >= 1.
        let count = mask.sum(1)?;
        summed.broadcast_div(&count)?.squeeze(0)?.to_vec1::<f32>()
    }
}
