//! Speech output and input through external programs.

use std::process::Stdio;

use async_trait::async_trait;
use mathtutor_config::SpeechConfig;
use mathtutor_core::error::MediaError;
use mathtutor_core::media::{SpeechInput, SpeechOutput};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::process::{run_capture, split_command};

/// Speaks by running a synthesizer (e.g. `espeak-ng`) with the text as
/// its last argument. At most one utterance plays: a new one stops the
/// previous process first.
pub struct CommandSpeaker {
    command: Vec<String>,
    current: Mutex<Option<Child>>,
}

impl CommandSpeaker {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            current: Mutex::new(None),
        }
    }

    /// Stop the utterance in progress, if any.
    pub async fn cancel(&self) {
        if let Some(mut child) = self.current.lock().await.take() {
            if let Err(e) = child.kill().await {
                debug!(error = %e, "Previous utterance already finished");
            }
        }
    }

    /// Wait for the current utterance to finish playing.
    pub async fn wait(&self) -> Result<(), MediaError> {
        if let Some(mut child) = self.current.lock().await.take() {
            child.wait().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl SpeechOutput for CommandSpeaker {
    async fn speak(&self, text: &str) -> Result<(), MediaError> {
        let (program, args) = split_command(&self.command)
            .ok_or_else(|| MediaError::UnsupportedEnvironment("Speech synthesis".into()))?;

        let mut current = self.current.lock().await;
        if let Some(mut previous) = current.take() {
            let _ = previous.kill().await;
        }

        debug!(program, chars = text.len(), "Speaking");
        let child = Command::new(program)
            .args(args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| MediaError::Launch {
                program: program.to_string(),
                reason: e.to_string(),
            })?;
        *current = Some(child);
        Ok(())
    }
}

/// Speech output that does nothing.
pub struct SilentSpeaker;

#[async_trait]
impl SpeechOutput for SilentSpeaker {
    async fn speak(&self, _text: &str) -> Result<(), MediaError> {
        Ok(())
    }
}

/// Single-shot recognition: runs a recognizer that prints one transcript.
pub struct CommandListener {
    command: Vec<String>,
}

impl CommandListener {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl SpeechInput for CommandListener {
    async fn listen(&self) -> Result<String, MediaError> {
        let (program, args) = split_command(&self.command)
            .ok_or_else(|| MediaError::UnsupportedEnvironment("Speech recognition".into()))?;
        let transcript = run_capture(program, args, None).await?;
        let transcript = transcript.trim().to_string();
        if transcript.is_empty() {
            warn!(program, "Recognizer returned no speech");
        }
        Ok(transcript)
    }
}

/// Speech input for environments without a recognizer.
pub struct NoSpeechInput;

#[async_trait]
impl SpeechInput for NoSpeechInput {
    async fn listen(&self) -> Result<String, MediaError> {
        Err(MediaError::UnsupportedEnvironment("Speech recognition".into()))
    }
}

/// Speaker for the configuration: silent unless speech is enabled.
pub fn speaker_from_config(config: &SpeechConfig) -> Box<dyn SpeechOutput> {
    if config.enabled {
        Box::new(CommandSpeaker::new(config.speak_command.clone()))
    } else {
        Box::new(SilentSpeaker)
    }
}

/// Listener for the configuration: unsupported without a command.
pub fn listener_from_config(config: &SpeechConfig) -> Box<dyn SpeechInput> {
    if config.listen_command.is_empty() {
        Box::new(NoSpeechInput)
    } else {
        Box::new(CommandListener::new(config.listen_command.clone()))
    }
}
