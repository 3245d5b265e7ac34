//! Local inference provider — runs the tutor model directly on your hardware.
//!
//! Uses [Candle](https://github.com/huggingface/candle) (Rust-native ML) to run
//! GGUF-quantized Llama-architecture models with no server and no API key.
//!
//! Supported model families:
//! - **TinyLlama** (1.1B params, Q4_K_M ~670 MB)
//! - **SmolLM** (135M–1.7B params, Q4 ~80–950 MB), the smallest practical models
//! - **Qwen2** (0.5B–1.5B params)
//! - any Llama-family `.gguf` file with a `tokenizer.json` next to it
//!
//! ```bash
//! MATHTUTOR_BACKEND=local MATHTUTOR_MODEL=tinyllama mathtutor load
//! MATHTUTOR_BACKEND=local MATHTUTOR_MODEL=/models/qwen.gguf mathtutor repl
//! ```

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama as qlm;
use hf_hub::api::sync::Api;
use mathtutor_core::error::ProviderError;
use mathtutor_core::message::{Message, Role};
use mathtutor_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage,
};
use tokenizers::Tokenizer;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

// ── Well-known model aliases ───────────────────────────────────────────

/// Aliases accepted by [`resolve_preset`].
pub const PRESETS: &[&str] = &[
    "tinyllama",
    "smollm",
    "smollm:135m",
    "smollm:360m",
    "smollm:1.7b",
    "qwen:0.5b",
    "qwen:1.5b",
];

/// Friendly alias resolved to a HuggingFace repo + filename.
struct ModelPreset {
    repo: &'static str,
    gguf_file: &'static str,
    tokenizer_repo: &'static str,
    chat_template: ChatTemplate,
}

/// Chat template used to lay out the system and user messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatTemplate {
    /// `<|system|>\n{content}</s>\n<|user|>\n{content}</s>\n<|assistant|>\n`
    TinyLlama,
    /// `<|im_start|>system\n{content}<|im_end|>\n...<|im_start|>assistant\n`
    ChatML,
    /// `[INST] <<SYS>>\n{system}\n<</SYS>>\n\n{content} [/INST]`
    Llama2,
    /// `<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n\n{content}<|eot_id|>`
    Llama3,
}

impl ChatTemplate {
    /// Guess the template of an arbitrary GGUF file from its tokenizer's special tokens.
    fn detect(tokenizer: &Tokenizer) -> Self {
        if tokenizer.token_to_id("<|eot_id|>").is_some() {
            Self::Llama3
        } else if tokenizer.token_to_id("<|im_start|>").is_some() {
            Self::ChatML
        } else if tokenizer.token_to_id("<|user|>").is_some() {
            Self::TinyLlama
        } else {
            Self::Llama2
        }
    }

    fn format(self, messages: &[Message]) -> String {
        match self {
            Self::TinyLlama => format_tinyllama(messages),
            Self::ChatML => format_chatml(messages),
            Self::Llama2 => format_llama2(messages),
            Self::Llama3 => format_llama3(messages),
        }
    }
}

fn resolve_preset(alias: &str) -> Option<ModelPreset> {
    match alias.to_lowercase().as_str() {
        "tinyllama" | "tiny-llama" | "tinyllama-1.1b" => Some(ModelPreset {
            repo: "TheBloke/TinyLlama-1.1B-Chat-v1.0-GGUF",
            gguf_file: "tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf",
            tokenizer_repo: "TinyLlama/TinyLlama-1.1B-Chat-v1.0",
            chat_template: ChatTemplate::TinyLlama,
        }),
        "smollm" | "smollm:135m" | "smollm-135m" => Some(ModelPreset {
            repo: "TheBloke/SmolLM-135M-Instruct-GGUF",
            gguf_file: "smollm-135m-instruct.Q4_K_M.gguf",
            tokenizer_repo: "HuggingFaceTB/SmolLM-135M-Instruct",
            chat_template: ChatTemplate::ChatML,
        }),
        "smollm:360m" | "smollm-360m" => Some(ModelPreset {
            repo: "TheBloke/SmolLM-360M-Instruct-GGUF",
            gguf_file: "smollm-360m-instruct.Q4_K_M.gguf",
            tokenizer_repo: "HuggingFaceTB/SmolLM-360M-Instruct",
            chat_template: ChatTemplate::ChatML,
        }),
        "smollm:1.7b" | "smollm-1.7b" => Some(ModelPreset {
            repo: "TheBloke/SmolLM-1.7B-Instruct-GGUF",
            gguf_file: "smollm-1.7b-instruct.Q4_K_M.gguf",
            tokenizer_repo: "HuggingFaceTB/SmolLM-1.7B-Instruct",
            chat_template: ChatTemplate::ChatML,
        }),
        "qwen:0.5b" | "qwen-0.5b" | "qwen2-0.5b" => Some(ModelPreset {
            repo: "Qwen/Qwen2-0.5B-Instruct-GGUF",
            gguf_file: "qwen2-0_5b-instruct-q4_k_m.gguf",
            tokenizer_repo: "Qwen/Qwen2-0.5B-Instruct",
            chat_template: ChatTemplate::ChatML,
        }),
        "qwen:1.5b" | "qwen-1.5b" | "qwen2-1.5b" => Some(ModelPreset {
            repo: "Qwen/Qwen2-1.5B-Instruct-GGUF",
            gguf_file: "qwen2-1_5b-instruct-q4_k_m.gguf",
            tokenizer_repo: "Qwen/Qwen2-1.5B-Instruct",
            chat_template: ChatTemplate::ChatML,
        }),
        _ => None,
    }
}

// ── Local Provider ─────────────────────────────────────────────────────

/// A provider that runs a GGUF-quantized model in-process via Candle.
///
/// The weights sit behind a Mutex: Candle CPU inference is single-threaded
/// and the KV cache belongs to one generation at a time.
pub struct LocalProvider {
    state: Arc<Mutex<LocalModelState>>,
    model_name: String,
}

/// The loaded model state (tokenizer + weights + template).
struct LocalModelState {
    model: qlm::ModelWeights,
    tokenizer: Tokenizer,
    device: Device,
    chat_template: ChatTemplate,
    eos_token_id: u32,
}

impl LocalProvider {
    /// Download (if needed) and load a model. Blocking; call from
    /// `spawn_blocking`.
    ///
    /// `model_name` is a preset alias (`"tinyllama"`, `"qwen:0.5b"`) or a
    /// path to a `.gguf` file. `progress` receives one line per phase.
    pub fn load(model_name: &str, progress: &dyn Fn(&str)) -> Result<Self, ProviderError> {
        let state = LocalModelState::load(model_name, progress)?;
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            model_name: model_name.to_string(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl LocalModelState {
    fn load(model_name: &str, progress: &dyn Fn(&str)) -> Result<Self, ProviderError> {
        let device = Device::Cpu;

        if model_name.ends_with(".gguf") && Path::new(model_name).exists() {
            return Self::load_from_path(Path::new(model_name), &device, progress);
        }

        let preset = resolve_preset(model_name).ok_or_else(|| {
            ProviderError::ModelNotFound(format!(
                "Unknown local model '{model_name}'. Available presets: {}. \
                 Or provide a path to a .gguf file.",
                PRESETS.join(", ")
            ))
        })?;

        info!(
            model = model_name,
            repo = preset.repo,
            file = preset.gguf_file,
            "Downloading/loading local model"
        );

        let api = Api::new().map_err(|e| {
            ProviderError::Network(format!("Failed to initialize HuggingFace Hub API: {e}"))
        })?;

        progress(&format!("Fetching {} from {}", preset.gguf_file, preset.repo));
        let model_path = api
            .model(preset.repo.to_string())
            .get(preset.gguf_file)
            .map_err(|e| {
                ProviderError::Network(format!(
                    "Failed to download model '{}' from '{}': {e}",
                    preset.gguf_file, preset.repo
                ))
            })?;
        info!(path = %model_path.display(), "Model file ready");

        progress("Fetching tokenizer");
        let tokenizer_path = api
            .model(preset.tokenizer_repo.to_string())
            .get("tokenizer.json")
            .map_err(|e| {
                ProviderError::Network(format!(
                    "Failed to download tokenizer from '{}': {e}",
                    preset.tokenizer_repo
                ))
            })?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to load tokenizer: {e}")))?;

        progress("Loading weights into memory");
        let model = read_weights(&model_path, &device)?;
        let eos_token_id = eos_token(&tokenizer);

        info!(eos_token_id, "Local model loaded successfully");

        Ok(Self {
            model,
            tokenizer,
            device,
            chat_template: preset.chat_template,
            eos_token_id,
        })
    }

    /// Load from an explicit GGUF file path; `tokenizer.json` must sit beside it.
    fn load_from_path(
        path: &Path,
        device: &Device,
        progress: &dyn Fn(&str),
    ) -> Result<Self, ProviderError> {
        info!(path = %path.display(), "Loading local GGUF model");

        let tokenizer_path = path.with_file_name("tokenizer.json");
        if !tokenizer_path.exists() {
            warn!(path = %tokenizer_path.display(), "No tokenizer next to GGUF file");
            return Err(ProviderError::NotConfigured(format!(
                "Expected a tokenizer at {}",
                tokenizer_path.display()
            )));
        }
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to load tokenizer: {e}")))?;

        progress("Loading weights into memory");
        let model = read_weights(path, device)?;
        let chat_template = ChatTemplate::detect(&tokenizer);
        let eos_token_id = eos_token(&tokenizer);
        debug!(?chat_template, eos_token_id, "Detected chat template");

        Ok(Self {
            model,
            tokenizer,
            device: device.clone(),
            chat_template,
            eos_token_id,
        })
    }

    /// Tokenize, sample up to `max_tokens`, and hand each newly decoded
    /// piece of text to `on_text`. Generation stops early at EOS or when
    /// `on_text` returns `false`.
    fn generate(
        &mut self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
        mut on_text: impl FnMut(&str) -> bool,
    ) -> Result<(String, Usage), ProviderError> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| inference_error(format!("Tokenization failed: {e}")))?;
        let prompt_tokens = encoding.get_ids();
        let prompt_token_count = prompt_tokens.len() as u32;

        debug!(
            prompt_tokens = prompt_token_count,
            max_tokens, temperature, "Starting local generation"
        );

        let mut logits_processor = if temperature <= 0.0 {
            LogitsProcessor::new(42, None, None)
        } else {
            LogitsProcessor::new(42, Some(temperature as f64), None)
        };

        let mut input = Tensor::new(prompt_tokens, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(map_candle_err)?;
        let mut index_pos = 0;
        let mut generated: Vec<u32> = Vec::new();
        let mut text = String::new();

        for _ in 0..max_tokens {
            let logits = self
                .model
                .forward(&input, index_pos)
                .and_then(|l| l.squeeze(0))
                .map_err(map_candle_err)?;
            index_pos += input.dim(1).map_err(map_candle_err)?;

            let next_token = logits_processor.sample(&logits).map_err(map_candle_err)?;
            if next_token == self.eos_token_id {
                break;
            }
            generated.push(next_token);

            // Re-decode the whole tail so multi-token characters come out whole.
            let decoded = self
                .tokenizer
                .decode(&generated, true)
                .map_err(|e| inference_error(format!("Detokenization failed: {e}")))?;
            if let Some(delta) = decoded.get(text.len()..).filter(|d| !d.is_empty()) {
                if !on_text(delta) {
                    debug!("Receiver dropped, stopping generation");
                    text = decoded;
                    break;
                }
            }
            text = decoded;

            input = Tensor::new(&[next_token][..], &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(map_candle_err)?;
        }

        let completion_tokens = generated.len() as u32;
        debug!(completion_tokens, output_len = text.len(), "Generation complete");

        Ok((
            text,
            Usage {
                prompt_tokens: prompt_token_count,
                completion_tokens,
                total_tokens: prompt_token_count + completion_tokens,
            },
        ))
    }
}

fn read_weights(path: &Path, device: &Device) -> Result<qlm::ModelWeights, ProviderError> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to open model file: {e}")))?;
    let gguf = gguf_file::Content::read(&mut file)
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to parse GGUF file: {e}")))?;
    qlm::ModelWeights::from_gguf(gguf, &mut file, device)
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to load model weights: {e}")))
}

fn eos_token(tokenizer: &Tokenizer) -> u32 {
    ["</s>", "<|endoftext|>", "<|im_end|>", "<|eot_id|>"]
        .iter()
        .find_map(|t| tokenizer.token_to_id(t))
        .unwrap_or(2)
}

fn clean_output(text: &str) -> String {
    text.trim()
        .trim_end_matches("</s>")
        .trim_end_matches("<|im_end|>")
        .trim_end_matches("<|eot_id|>")
        .trim()
        .to_string()
}

fn inference_error(message: String) -> ProviderError {
    ProviderError::ApiError {
        status_code: 500,
        message,
    }
}

fn map_candle_err(e: candle_core::Error) -> ProviderError {
    inference_error(format!("Candle inference error: {e}"))
}

// ── Chat templates ─────────────────────────────────────────────────────

fn format_tinyllama(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for msg in messages {
        prompt.push_str(match msg.role {
            Role::System => "<|system|>\n",
            Role::User => "<|user|>\n",
            Role::Assistant => "<|assistant|>\n",
        });
        prompt.push_str(&msg.content);
        prompt.push_str("</s>\n");
    }
    prompt.push_str("<|assistant|>\n");
    prompt
}

fn format_chatml(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for msg in messages {
        prompt.push_str("<|im_start|>");
        prompt.push_str(msg.role.as_str());
        prompt.push('\n');
        prompt.push_str(&msg.content);
        prompt.push_str("<|im_end|>\n");
    }
    prompt.push_str("<|im_start|>assistant\n");
    prompt
}

fn format_llama2(messages: &[Message]) -> String {
    let mut prompt = String::new();
    let mut system_prompt = String::new();

    for msg in messages {
        match msg.role {
            Role::System => system_prompt = msg.content.clone(),
            Role::User => {
                prompt.push_str("[INST] ");
                if !system_prompt.is_empty() {
                    prompt.push_str("<<SYS>>\n");
                    prompt.push_str(&system_prompt);
                    prompt.push_str("\n<</SYS>>\n\n");
                    system_prompt.clear();
                }
                prompt.push_str(&msg.content);
                prompt.push_str(" [/INST]");
            }
            Role::Assistant => {
                prompt.push(' ');
                prompt.push_str(&msg.content);
                prompt.push_str(" </s>");
            }
        }
    }
    prompt
}

fn format_llama3(messages: &[Message]) -> String {
    let mut prompt = String::from("<|begin_of_text|>");
    for msg in messages {
        prompt.push_str("<|start_header_id|>");
        prompt.push_str(msg.role.as_str());
        prompt.push_str("<|end_header_id|>\n\n");
        prompt.push_str(&msg.content);
        prompt.push_str("<|eot_id|>");
    }
    prompt.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
    prompt
}

// ── Provider trait implementation ──────────────────────────────────────

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let max_tokens = request.max_tokens.unwrap_or(512);
        let temperature = request.temperature;
        let messages = request.messages;

        let state = self.state.clone();
        let (output, usage) = tokio::task::spawn_blocking(move || {
            let mut state = state.blocking_lock();
            let prompt = state.chat_template.format(&messages);
            state.generate(&prompt, max_tokens, temperature, |_| true)
        })
        .await
        .map_err(|e| inference_error(format!("Inference task panicked: {e}")))??;

        Ok(ProviderResponse {
            message: Message::assistant(clean_output(&output)),
            usage: Some(usage),
            model: format!("local/{}", self.model_name),
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let max_tokens = request.max_tokens.unwrap_or(512);
        let temperature = request.temperature;
        let messages = request.messages;
        let (tx, rx) = tokio::sync::mpsc::channel(64);

        let state = self.state.clone();
        tokio::task::spawn_blocking(move || {
            let mut state = state.blocking_lock();
            let prompt = state.chat_template.format(&messages);
            let result = state.generate(&prompt, max_tokens, temperature, |delta| {
                tx.blocking_send(Ok(StreamChunk::text(delta))).is_ok()
            });
            let _ = tx.blocking_send(result.map(|(_, usage)| StreamChunk::finished(Some(usage))));
        });

        Ok(rx)
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        Ok(PRESETS.iter().map(|p| p.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tutor_messages() -> Vec<Message> {
        vec![
            Message::system("You are a math tutor."),
            Message::user("What is 2 + 2?"),
        ]
    }

    #[test]
    fn resolve_preset_aliases() {
        assert!(resolve_preset("tinyllama").is_some());
        assert!(resolve_preset("TinyLlama").is_some());
        assert!(resolve_preset("smollm:135m").is_some());
        assert!(resolve_preset("qwen:0.5b").is_some());
        assert!(resolve_preset("phi3:mini").is_none());
    }

    #[test]
    fn every_listed_preset_resolves() {
        for alias in PRESETS {
            assert!(resolve_preset(alias).is_some(), "{alias}");
        }
    }

    #[test]
    fn chat_template_tinyllama() {
        let prompt = ChatTemplate::TinyLlama.format(&tutor_messages());
        assert!(prompt.starts_with("<|system|>\nYou are a math tutor.</s>\n"));
        assert!(prompt.contains("<|user|>\nWhat is 2 + 2?</s>"));
        assert!(prompt.ends_with("<|assistant|>\n"));
    }

    #[test]
    fn chat_template_chatml() {
        let prompt = ChatTemplate::ChatML.format(&tutor_messages());
        assert!(prompt.contains("<|im_start|>system\nYou are a math tutor.<|im_end|>"));
        assert!(prompt.contains("<|im_start|>user"));
        assert!(prompt.ends_with("<|im_start|>assistant\n"));
    }

    #[test]
    fn chat_template_llama2_folds_system_into_first_turn() {
        let prompt = ChatTemplate::Llama2.format(&tutor_messages());
        assert_eq!(
            prompt,
            "[INST] <<SYS>>\nYou are a math tutor.\n<</SYS>>\n\nWhat is 2 + 2? [/INST]"
        );
    }

    #[test]
    fn chat_template_llama3() {
        let prompt = ChatTemplate::Llama3.format(&tutor_messages());
        assert!(prompt.starts_with("<|begin_of_text|>"));
        assert!(prompt.contains("<|start_header_id|>user<|end_header_id|>\n\nWhat is 2 + 2?"));
        assert!(prompt.ends_with("<|start_header_id|>assistant<|end_header_id|>\n\n"));
    }

    #[test]
    fn clean_output_strips_end_markers() {
        assert_eq!(clean_output("  It is 4.<|im_end|> "), "It is 4.");
        assert_eq!(clean_output("Four</s>"), "Four");
    }
}
