use crate::core::config::Config;
use crate::core::session::SessionStore;
use crate::services::catalog::{Catalog, VoiceProfile};
use crate::services::generation::{
    generate_cancellable, GenerationClient, GenerationRequest, GenerationResult, GenerationWait,
};
use crate::services::preview::{
    AudioPreviewSink, NullPreviewSink, PreviewController, PreviewId, PreviewSink, PreviewState,
};
use crate::utils::media;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{InquireError, Select, Text};
use log::{debug, warn};
use std::future::Future;
use std::time::Duration;

/// One page of the linear flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    Script,
    Avatar,
    Voice,
    Result,
}

/// Where a step operation leaves the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Forward,
    Back,
}

/// Outcome of a generate attempt, for the front-end to render.
#[derive(Debug)]
pub enum GenerateOutcome {
    /// Result persisted, flow advanced.
    Completed(GenerationResult),
    /// No voice selected, upstream state gone, or a call already in flight;
    /// nothing happened.
    NotReady,
    /// Cancelled before the backend answered; nothing written.
    Cancelled,
    /// Backend or storage failure; the user stays on the voice step.
    Failed(String),
}

pub struct WizardManager {
    config: Config,
    catalog: Catalog,
    session: SessionStore,
    generator: Box<dyn GenerationClient>,
    step: WizardStep,
    generating: bool,
}

impl WizardManager {
    pub fn new(
        config: Config,
        catalog: Catalog,
        session: SessionStore,
        generator: Box<dyn GenerationClient>,
    ) -> Self {
        Self {
            config,
            catalog,
            session,
            generator,
            step: WizardStep::Script,
            generating: false,
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    /// Step guard: verifies the upstream state a step depends on, collapsing
    /// back to the script step when any piece is missing. The redirect is
    /// silent; no error reaches the user.
    pub async fn enter(&mut self, step: WizardStep) -> Result<WizardStep> {
        let allowed = match step {
            WizardStep::Script => true,
            WizardStep::Avatar => self.session.load_script().await?.is_some(),
            WizardStep::Voice => {
                self.session.load_script().await?.is_some()
                    && self.session.load_avatar().await?.is_some()
            }
            WizardStep::Result => self.session.load_result().await?.is_some(),
        };

        self.step = if allowed {
            step
        } else {
            debug!("Guard rejected entry to {:?}, redirecting to script entry", step);
            WizardStep::Script
        };
        Ok(self.step)
    }

    /// Text capture. Whitespace-only input is inert: no state written, no
    /// transition, no error surfaced.
    pub async fn submit_script(&mut self, text: &str) -> Result<Transition> {
        if text.trim().is_empty() {
            return Ok(Transition::Stay);
        }
        self.session.save_script(text).await?;
        self.step = WizardStep::Avatar;
        Ok(Transition::Forward)
    }

    /// Persists the chosen avatar immediately, overwriting any prior choice.
    pub async fn choose_avatar(&mut self, id: u32) -> Result<()> {
        let avatar = self
            .catalog
            .avatar(id)
            .with_context(|| format!("Avatar {} is not in the catalog", id))?
            .clone();
        self.session.save_avatar(&avatar).await
    }

    /// `Next` is inert until an avatar was chosen.
    pub async fn avatar_next(&mut self) -> Result<Transition> {
        if self.session.load_avatar().await?.is_none() {
            return Ok(Transition::Stay);
        }
        self.step = WizardStep::Voice;
        Ok(Transition::Forward)
    }

    /// `Back` never clears stored state.
    pub fn avatar_back(&mut self) -> Transition {
        self.step = WizardStep::Script;
        Transition::Back
    }

    pub async fn choose_voice(&mut self, id: u32) -> Result<()> {
        let voice = self
            .catalog
            .voice(id)
            .with_context(|| format!("Voice {} is not in the catalog", id))?
            .clone();
        self.session.save_voice(&voice).await
    }

    pub fn voice_back(&mut self) -> Transition {
        self.step = WizardStep::Avatar;
        Transition::Back
    }

    /// `Generate` gate: a voice must be selected and no call in flight.
    pub async fn can_generate(&self) -> Result<bool> {
        Ok(!self.generating && self.session.load_voice().await?.is_some())
    }

    /// Runs the generation call with `{text, avatar, voice}` from the session
    /// store, racing it against `cancel`. On success the result record is
    /// persisted and the flow advances; every other outcome leaves the user
    /// on the voice step with the in-flight flag cleared and nothing written.
    pub async fn handle_generate(
        &mut self,
        cancel: impl Future<Output = ()>,
    ) -> Result<GenerateOutcome> {
        if self.generating {
            return Ok(GenerateOutcome::NotReady);
        }
        let (Some(text), Some(avatar), Some(voice)) = (
            self.session.load_script().await?,
            self.session.load_avatar().await?,
            self.session.load_voice().await?,
        ) else {
            return Ok(GenerateOutcome::NotReady);
        };

        self.generating = true;
        let request = GenerationRequest { text, avatar, voice };

        let outcome = match generate_cancellable(self.generator.as_ref(), &request, cancel).await {
            Ok(GenerationWait::Finished(output)) => {
                let result = GenerationResult::from_request(request, output);
                // A lost write must surface like a failed call, not vanish
                match self.session.save_result(&result).await {
                    Ok(()) => {
                        self.step = WizardStep::Result;
                        GenerateOutcome::Completed(result)
                    }
                    Err(e) => GenerateOutcome::Failed(format!("{:#}", e)),
                }
            }
            Ok(GenerationWait::Cancelled) => GenerateOutcome::Cancelled,
            Err(e) => GenerateOutcome::Failed(format!("{:#}", e)),
        };

        self.generating = false;
        Ok(outcome)
    }

    /// Clears the session and returns to the first step.
    pub async fn start_over(&mut self) -> Result<()> {
        self.session.clear().await?;
        self.step = WizardStep::Script;
        Ok(())
    }

    // --- Interactive front-end ---

    pub async fn run(&mut self) -> Result<()> {
        let sink: Box<dyn PreviewSink> = if self.config.preview.enabled {
            match AudioPreviewSink::spawn() {
                Ok(sink) => Box::new(sink),
                Err(e) => {
                    warn!("Audio preview unavailable: {:#}", e);
                    Box::new(NullPreviewSink)
                }
            }
        } else {
            Box::new(NullPreviewSink)
        };
        let mut preview = PreviewController::new(sink);
        let http = reqwest::Client::new();

        println!("AI Talking Head Synthesis");

        loop {
            match self.step {
                WizardStep::Script => {
                    if !self.run_script_step().await? {
                        break;
                    }
                }
                WizardStep::Avatar => self.run_avatar_step().await?,
                WizardStep::Voice => self.run_voice_step(&mut preview, &http).await?,
                WizardStep::Result => {
                    if !self.run_result_step().await? {
                        break;
                    }
                }
            }
        }

        preview.stop();
        Ok(())
    }

    /// Returns false when the user quits.
    async fn run_script_step(&mut self) -> Result<bool> {
        self.enter(WizardStep::Script).await?;
        let existing = self.session.load_script().await?;

        println!();
        let mut prompt = Text::new("Script:")
            .with_help_message("The text your avatar will speak. Esc quits.");
        if let Some(text) = &existing {
            prompt = prompt.with_initial_value(text);
        }

        match prompt.prompt() {
            Ok(text) => {
                // A lost write keeps the user here with a notice, like a
                // failed generation call
                if let Err(e) = self.submit_script(&text).await {
                    println!("Could not save your script: {:#}", e);
                    println!("Please try again.");
                }
                Ok(true)
            }
            Err(InquireError::OperationCanceled) | Err(InquireError::OperationInterrupted) => {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn run_avatar_step(&mut self) -> Result<()> {
        if self.enter(WizardStep::Avatar).await? != WizardStep::Avatar {
            return Ok(());
        }

        let script = self.session.load_script().await?.unwrap_or_default();
        println!("\nYour text: {}", excerpt(&script));

        let avatars = self.catalog.avatars.clone();
        loop {
            let selected = self.session.load_avatar().await?;

            let mut labels = Vec::new();
            let mut actions = Vec::new();
            for a in &avatars {
                let marker = if selected.as_ref().map(|s| s.id) == Some(a.id) {
                    "● "
                } else {
                    "  "
                };
                labels.push(format!("{}{} ({})", marker, a.name, a.category));
                actions.push(AvatarAction::Choose(a.id));
            }
            if selected.is_some() {
                labels.push("Next".to_string());
                actions.push(AvatarAction::Next);
            }
            labels.push("Back".to_string());
            actions.push(AvatarAction::Back);

            let choice = Select::new("Select an avatar:", labels).raw_prompt();
            match choice {
                Ok(opt) => match actions[opt.index] {
                    AvatarAction::Choose(id) => {
                        if let Err(e) = self.choose_avatar(id).await {
                            println!("Could not save your selection: {:#}", e);
                        }
                    }
                    AvatarAction::Next => {
                        if self.avatar_next().await? == Transition::Forward {
                            return Ok(());
                        }
                    }
                    AvatarAction::Back => {
                        self.avatar_back();
                        return Ok(());
                    }
                },
                Err(InquireError::OperationCanceled)
                | Err(InquireError::OperationInterrupted) => {
                    self.avatar_back();
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn run_voice_step(
        &mut self,
        preview: &mut PreviewController,
        http: &reqwest::Client,
    ) -> Result<()> {
        if self.enter(WizardStep::Voice).await? != WizardStep::Voice {
            return Ok(());
        }

        let script = self.session.load_script().await?.unwrap_or_default();
        let avatar = match self.session.load_avatar().await? {
            Some(avatar) => avatar,
            None => return Ok(()),
        };
        println!("\nYour text: {}", excerpt(&script));
        println!("Avatar: {} ({})", avatar.name, avatar.category);

        let voices = self.catalog.voices.clone();
        loop {
            preview.refresh();
            let selected = self.session.load_voice().await?;
            if let Some(voice) = &selected {
                println!("Selected voice: {} ({} {})", voice.name, voice.accent, voice.category);
            }

            let mut labels = Vec::new();
            let mut actions = Vec::new();
            labels.push("Select a voice".to_string());
            actions.push(VoiceAction::SelectVoice);
            labels.push("Preview a voice".to_string());
            actions.push(VoiceAction::PreviewVoice);
            labels.push("Preview avatar".to_string());
            actions.push(VoiceAction::PreviewAvatar);
            labels.push("Upload your own voice".to_string());
            actions.push(VoiceAction::UploadCustom);
            if self.can_generate().await? {
                labels.push("Generate video".to_string());
                actions.push(VoiceAction::Generate);
            }
            labels.push("Back".to_string());
            actions.push(VoiceAction::Back);

            let choice = Select::new("Voice step:", labels).raw_prompt();
            let action = match choice {
                Ok(opt) => actions[opt.index],
                Err(InquireError::OperationCanceled)
                | Err(InquireError::OperationInterrupted) => VoiceAction::Back,
                Err(e) => return Err(e.into()),
            };

            match action {
                VoiceAction::SelectVoice => {
                    if let Some(id) = pick_voice(&voices, "Voices:")? {
                        if let Err(e) = self.choose_voice(id).await {
                            println!("Could not save your selection: {:#}", e);
                        }
                    }
                }
                VoiceAction::PreviewVoice => {
                    let previewable: Vec<VoiceProfile> = voices
                        .iter()
                        .filter(|v| v.preview_ref.is_some())
                        .cloned()
                        .collect();
                    if let Some(id) = pick_voice(&previewable, "Preview which voice?")? {
                        if let Some(voice) = previewable.iter().find(|v| v.id == id) {
                            let media_ref = voice.preview_ref.clone().unwrap_or_default();
                            start_preview(preview, http, PreviewId::Voice(id), &media_ref).await;
                        }
                    }
                }
                VoiceAction::PreviewAvatar => {
                    start_preview(preview, http, PreviewId::Avatar(avatar.id), &avatar.media_ref)
                        .await;
                }
                VoiceAction::UploadCustom => {
                    println!("Uploading your own voice is coming soon.");
                }
                VoiceAction::Generate => {
                    // Release the playback slot before the call
                    preview.stop();
                    if self.run_generate().await? {
                        return Ok(());
                    }
                }
                VoiceAction::Back => {
                    preview.stop();
                    self.voice_back();
                    return Ok(());
                }
            }
        }
    }

    /// Returns true when the flow advanced to the result step.
    async fn run_generate(&mut self) -> Result<bool> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner.set_message("Generating video... (Ctrl-C cancels)");

        let cancel = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        let outcome = self.handle_generate(cancel).await?;
        spinner.finish_and_clear();

        match outcome {
            GenerateOutcome::Completed(_) => Ok(true),
            GenerateOutcome::Cancelled => {
                println!("Generation cancelled.");
                Ok(false)
            }
            GenerateOutcome::Failed(message) => {
                println!("There was an error generating your video: {}", message);
                println!("Please try again.");
                Ok(false)
            }
            GenerateOutcome::NotReady => Ok(false),
        }
    }

    /// Returns false when the user quits.
    async fn run_result_step(&mut self) -> Result<bool> {
        if self.enter(WizardStep::Result).await? != WizardStep::Result {
            return Ok(true);
        }
        let result = match self.session.load_result().await? {
            Some(result) => result,
            None => return Ok(true),
        };

        println!("\nYour video is ready.");
        println!("  Text:    {}", excerpt(&result.text));
        println!("  Avatar:  {} ({})", result.avatar.name, result.avatar.category);
        println!("  Voice:   {} ({} {})", result.voice.name, result.voice.accent, result.voice.category);
        println!("  Media:   {}", result.media_ref);
        println!("  Created: {}", result.created_at.to_rfc3339());

        let choice = Select::new(
            "What next?",
            vec!["Start over".to_string(), "Exit".to_string()],
        )
        .raw_prompt();
        match choice {
            Ok(opt) if opt.index == 0 => {
                self.start_over().await?;
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(InquireError::OperationCanceled) | Err(InquireError::OperationInterrupted) => {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Clone, Copy)]
enum AvatarAction {
    Choose(u32),
    Next,
    Back,
}

#[derive(Clone, Copy)]
enum VoiceAction {
    SelectVoice,
    PreviewVoice,
    PreviewAvatar,
    UploadCustom,
    Generate,
    Back,
}

/// Sub-menu over a voice list. `None` when the user backs out.
fn pick_voice(voices: &[VoiceProfile], title: &str) -> Result<Option<u32>> {
    let labels: Vec<String> = voices
        .iter()
        .map(|v| format!("{} - {} ({})", v.name, v.accent, v.category))
        .collect();

    match Select::new(title, labels).raw_prompt() {
        Ok(opt) => Ok(Some(voices[opt.index].id)),
        Err(InquireError::OperationCanceled) | Err(InquireError::OperationInterrupted) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Preview failures are logged and leave playback idle; they never take the
/// step down.
async fn start_preview(
    preview: &mut PreviewController,
    http: &reqwest::Client,
    id: PreviewId,
    media_ref: &str,
) {
    let state = match media::load_media_bytes(http, media_ref).await {
        Ok(data) => match preview.toggle(id, data) {
            Ok(state) => state,
            Err(e) => {
                warn!("Preview failed for {}: {:#}", media_ref, e);
                return;
            }
        },
        Err(e) => {
            warn!("Preview media unavailable: {:#}", e);
            return;
        }
    };

    match state {
        PreviewState::Playing(_) => println!("Playing preview..."),
        PreviewState::Idle => println!("Preview stopped."),
    }
}

fn excerpt(text: &str) -> String {
    const LIMIT: usize = 80;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let head: String = text.chars().take(LIMIT - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::{NativeStorage, Storage};
    use crate::core::session::KEY_RESULT;
    use crate::services::generation::GenerationOutput;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Arc;
    use tempfile::TempDir;

    enum Mode {
        Ok,
        Fail,
        Hang,
    }

    struct MockGenerationClient {
        mode: Mode,
    }

    #[async_trait]
    impl GenerationClient for MockGenerationClient {
        async fn generate(&self, _request: &GenerationRequest) -> Result<GenerationOutput> {
            match self.mode {
                Mode::Ok => Ok(GenerationOutput {
                    media_ref: "mock/video.mp4".to_string(),
                    created_at: Utc::now(),
                }),
                Mode::Fail => Err(anyhow::anyhow!("mock generation error")),
                Mode::Hang => {
                    futures_util::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    fn manager(temp_dir: &TempDir, mode: Mode) -> WizardManager {
        let storage = Arc::new(NativeStorage::new());
        let session = SessionStore::new(
            storage,
            &temp_dir.path().join("session").to_string_lossy(),
        );
        WizardManager::new(
            Config::default(),
            Catalog::builtin(),
            session,
            Box::new(MockGenerationClient { mode }),
        )
    }

    fn never() -> futures_util::future::Pending<()> {
        futures_util::future::pending()
    }

    #[tokio::test]
    async fn test_submit_script_persists_and_advances() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut wizard = manager(&temp_dir, Mode::Ok);

        let transition = wizard.submit_script("Hello world").await?;
        assert_eq!(transition, Transition::Forward);
        assert_eq!(wizard.step(), WizardStep::Avatar);
        assert_eq!(
            wizard.session.load_script().await?.as_deref(),
            Some("Hello world")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_submit_whitespace_script_is_inert() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut wizard = manager(&temp_dir, Mode::Ok);

        let transition = wizard.submit_script("   \n\t").await?;
        assert_eq!(transition, Transition::Stay);
        assert_eq!(wizard.step(), WizardStep::Script);
        assert!(wizard.session.load_script().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_guard_avatar_without_script_redirects() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut wizard = manager(&temp_dir, Mode::Ok);

        assert_eq!(wizard.enter(WizardStep::Avatar).await?, WizardStep::Script);
        Ok(())
    }

    #[tokio::test]
    async fn test_guard_voice_without_avatar_redirects() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut wizard = manager(&temp_dir, Mode::Ok);

        wizard.submit_script("Hello world").await?;
        assert_eq!(wizard.enter(WizardStep::Voice).await?, WizardStep::Script);
        Ok(())
    }

    #[tokio::test]
    async fn test_guard_voice_with_upstream_state_passes() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut wizard = manager(&temp_dir, Mode::Ok);

        wizard.submit_script("Hello world").await?;
        wizard.choose_avatar(1).await?;
        assert_eq!(wizard.enter(WizardStep::Voice).await?, WizardStep::Voice);
        Ok(())
    }

    #[tokio::test]
    async fn test_guard_redirects_for_direct_voice_entry_with_empty_store() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut wizard = manager(&temp_dir, Mode::Ok);

        assert_eq!(wizard.enter(WizardStep::Voice).await?, WizardStep::Script);
        assert_eq!(wizard.step(), WizardStep::Script);
        Ok(())
    }

    #[tokio::test]
    async fn test_avatar_selection_is_last_write_wins() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut wizard = manager(&temp_dir, Mode::Ok);

        wizard.submit_script("Hello world").await?;
        wizard.choose_avatar(1).await?;
        wizard.choose_avatar(2).await?;

        let stored = wizard.session.load_avatar().await?.unwrap();
        assert_eq!(stored.id, 2);
        assert_eq!(stored.name, "Michael");
        Ok(())
    }

    #[tokio::test]
    async fn test_avatar_next_without_selection_stays() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut wizard = manager(&temp_dir, Mode::Ok);

        wizard.submit_script("Hello world").await?;
        assert_eq!(wizard.avatar_next().await?, Transition::Stay);
        assert_eq!(wizard.step(), WizardStep::Avatar);
        Ok(())
    }

    #[tokio::test]
    async fn test_back_keeps_stored_state() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut wizard = manager(&temp_dir, Mode::Ok);

        wizard.submit_script("Hello world").await?;
        wizard.choose_avatar(3).await?;
        wizard.avatar_back();

        assert_eq!(wizard.step(), WizardStep::Script);
        assert!(wizard.session.load_script().await?.is_some());
        assert!(wizard.session.load_avatar().await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_choose_avatar_outside_catalog_errors() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut wizard = manager(&temp_dir, Mode::Ok);

        wizard.submit_script("Hello world").await?;
        assert!(wizard.choose_avatar(99).await.is_err());
        assert!(wizard.session.load_avatar().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_without_voice_is_not_ready() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut wizard = manager(&temp_dir, Mode::Ok);

        wizard.submit_script("Hello world").await?;
        wizard.choose_avatar(1).await?;

        assert!(!wizard.can_generate().await?);
        let outcome = wizard.handle_generate(never()).await?;
        assert!(matches!(outcome, GenerateOutcome::NotReady));
        assert!(wizard.session.load_result().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_end_to_end() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut wizard = manager(&temp_dir, Mode::Ok);

        wizard.submit_script("Hello world").await?;
        wizard.choose_avatar(1).await?;
        assert_eq!(wizard.avatar_next().await?, Transition::Forward);
        wizard.choose_voice(2).await?;
        assert!(wizard.can_generate().await?);

        let result = match wizard.handle_generate(never()).await? {
            GenerateOutcome::Completed(result) => result,
            other => panic!("expected completion, got {:?}", other),
        };

        assert_eq!(result.text, "Hello world");
        assert_eq!(result.avatar.id, 1);
        assert_eq!(result.voice.id, 2);
        assert_eq!(wizard.step(), WizardStep::Result);

        let stored = wizard.session.load_result().await?.unwrap();
        assert_eq!(stored, result);
        assert!(!wizard.is_generating());
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_failure_keeps_user_on_voice_step() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut wizard = manager(&temp_dir, Mode::Fail);

        wizard.submit_script("Hello world").await?;
        wizard.choose_avatar(1).await?;
        wizard.avatar_next().await?;
        wizard.choose_voice(2).await?;

        let message = match wizard.handle_generate(never()).await? {
            GenerateOutcome::Failed(message) => message,
            other => panic!("expected failure, got {:?}", other),
        };
        assert!(message.contains("mock generation error"));
        assert!(!wizard.is_generating());
        assert_eq!(wizard.step(), WizardStep::Voice);
        assert!(wizard.session.load_result().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_while_in_flight_is_noop() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut wizard = manager(&temp_dir, Mode::Ok);

        wizard.submit_script("Hello world").await?;
        wizard.choose_avatar(1).await?;
        wizard.avatar_next().await?;
        wizard.choose_voice(2).await?;

        wizard.generating = true;
        assert!(!wizard.can_generate().await?);
        let outcome = wizard.handle_generate(never()).await?;
        assert!(matches!(outcome, GenerateOutcome::NotReady));
        assert!(wizard.session.load_result().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_cancelled_writes_nothing() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut wizard = manager(&temp_dir, Mode::Hang);

        wizard.submit_script("Hello world").await?;
        wizard.choose_avatar(1).await?;
        wizard.avatar_next().await?;
        wizard.choose_voice(2).await?;

        let outcome = wizard.handle_generate(async {}).await?;
        assert!(matches!(outcome, GenerateOutcome::Cancelled));
        assert!(!wizard.is_generating());
        assert_eq!(wizard.step(), WizardStep::Voice);
        assert!(wizard.session.load_result().await?.is_none());
        Ok(())
    }

    struct FailingResultStorage {
        inner: NativeStorage,
    }

    #[async_trait]
    impl Storage for FailingResultStorage {
        async fn read(&self, path: &str) -> Result<Vec<u8>> {
            self.inner.read(path).await
        }

        async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
            if path.ends_with(KEY_RESULT) {
                return Err(anyhow::anyhow!("disk full"));
            }
            self.inner.write(path, content).await
        }

        async fn delete(&self, path: &str) -> Result<()> {
            self.inner.delete(path).await
        }

        async fn exists(&self, path: &str) -> Result<bool> {
            self.inner.exists(path).await
        }
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces_like_a_failed_call() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let session = SessionStore::new(
            Arc::new(FailingResultStorage {
                inner: NativeStorage::new(),
            }),
            &temp_dir.path().join("session").to_string_lossy(),
        );
        let mut wizard = WizardManager::new(
            Config::default(),
            Catalog::builtin(),
            session,
            Box::new(MockGenerationClient { mode: Mode::Ok }),
        );

        wizard.submit_script("Hello world").await?;
        wizard.choose_avatar(1).await?;
        wizard.avatar_next().await?;
        wizard.choose_voice(2).await?;

        let message = match wizard.handle_generate(never()).await? {
            GenerateOutcome::Failed(message) => message,
            other => panic!("expected failure, got {:?}", other),
        };
        assert!(message.contains("disk full"));
        assert!(!wizard.is_generating());
        assert_eq!(wizard.step(), WizardStep::Voice);
        assert!(wizard.session.load_result().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_start_over_clears_session() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut wizard = manager(&temp_dir, Mode::Ok);

        wizard.submit_script("Hello world").await?;
        wizard.choose_avatar(1).await?;
        wizard.avatar_next().await?;
        wizard.choose_voice(2).await?;
        wizard.handle_generate(never()).await?;

        wizard.start_over().await?;
        assert_eq!(wizard.step(), WizardStep::Script);
        assert!(wizard.session.load_script().await?.is_none());
        assert!(wizard.session.load_result().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_result_guard_requires_a_result() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut wizard = manager(&temp_dir, Mode::Ok);

        assert_eq!(wizard.enter(WizardStep::Result).await?, WizardStep::Script);
        Ok(())
    }

    #[test]
    fn test_excerpt_truncates_long_text() {
        let short = "Hello world";
        assert_eq!(excerpt(short), short);

        let long = "x".repeat(200);
        let shown = excerpt(&long);
        assert_eq!(shown.chars().count(), 80);
        assert!(shown.ends_with("..."));
    }
}
