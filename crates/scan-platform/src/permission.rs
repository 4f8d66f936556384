use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use scan_core::PermissionStatus;
use tokio::sync::oneshot;

/// One-shot reply handed to the OS permission prompt.
///
/// The platform resolves it from whatever thread its callback fires on. Dropping it
/// unresolved counts as a denial.
#[derive(Debug)]
pub struct PermissionReply {
    tx: oneshot::Sender<PermissionStatus>,
}

impl PermissionReply {
    pub fn new(tx: oneshot::Sender<PermissionStatus>) -> Self {
        Self { tx }
    }

    pub fn resolve(self, status: PermissionStatus) {
        let _ = self.tx.send(status);
    }

    pub fn grant(self) {
        self.resolve(PermissionStatus::Granted);
    }

    pub fn deny(self) {
        self.resolve(PermissionStatus::Denied);
    }
}

/// Platform camera-permission prompt.
pub trait PermissionPrompt: Send + Sync {
    /// Show the OS prompt (or answer from the OS cache) and resolve `reply` when known.
    fn request_camera_permission(&self, reply: PermissionReply);

    /// Open the system settings page where the user can grant camera access.
    fn open_settings(&self);
}

#[derive(Debug, Default)]
struct ScriptState {
    answers: VecDeque<PermissionStatus>,
    held: Vec<PermissionReply>,
    prompts: usize,
    settings_opened: usize,
}

/// Prompt that answers from a script, or holds replies until the test releases them.
#[derive(Clone, Debug, Default)]
pub struct ScriptedPermissionPrompt {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedPermissionPrompt {
    /// Answer every prompt with `status`.
    pub fn always(status: PermissionStatus) -> Self {
        Self::with_answers([status])
    }

    /// Answer prompts in order; the last answer repeats once the script runs out.
    pub fn with_answers(answers: impl IntoIterator<Item = PermissionStatus>) -> Self {
        let prompt = Self::default();
        if let Ok(mut state) = prompt.state.lock() {
            state.answers = answers.into_iter().collect();
        }
        prompt
    }

    /// Hold every reply until [`Self::release`] is called.
    pub fn manual() -> Self {
        Self::default()
    }

    /// Resolve all held replies with `status`. Returns how many were released.
    pub fn release(&self, status: PermissionStatus) -> usize {
        let held = match self.state.lock() {
            Ok(mut state) => std::mem::take(&mut state.held),
            Err(_) => return 0,
        };
        let released = held.len();
        for reply in held {
            reply.resolve(status);
        }
        released
    }

    /// Number of OS prompts shown so far.
    pub fn prompt_count(&self) -> usize {
        self.state.lock().map(|state| state.prompts).unwrap_or(0)
    }

    /// Number of times the settings page was opened.
    pub fn settings_opened(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.settings_opened)
            .unwrap_or(0)
    }
}

impl PermissionPrompt for ScriptedPermissionPrompt {
    fn request_camera_permission(&self, reply: PermissionReply) {
        let answer = match self.state.lock() {
            Ok(mut state) => {
                state.prompts += 1;
                let answer = if state.answers.len() > 1 {
                    state.answers.pop_front()
                } else {
                    state.answers.front().copied()
                };
                if answer.is_none() {
                    state.held.push(reply);
                    return;
                }
                answer
            }
            Err(_) => None,
        };

        match answer {
            Some(status) => reply.resolve(status),
            None => reply.deny(),
        }
    }

    fn open_settings(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.settings_opened += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ask(prompt: &dyn PermissionPrompt) -> oneshot::Receiver<PermissionStatus> {
        let (tx, rx) = oneshot::channel();
        prompt.request_camera_permission(PermissionReply::new(tx));
        rx
    }

    #[tokio::test]
    async fn answers_from_script_and_repeats_last() {
        let prompt = ScriptedPermissionPrompt::with_answers([
            PermissionStatus::Denied,
            PermissionStatus::Granted,
        ]);

        assert_eq!(ask(&prompt).await, Ok(PermissionStatus::Denied));
        assert_eq!(ask(&prompt).await, Ok(PermissionStatus::Granted));
        assert_eq!(ask(&prompt).await, Ok(PermissionStatus::Granted));
        assert_eq!(prompt.prompt_count(), 3);
    }

    #[tokio::test]
    async fn manual_prompt_holds_until_released() {
        let prompt = ScriptedPermissionPrompt::manual();
        let mut rx = ask(&prompt);
        assert!(rx.try_recv().is_err());

        assert_eq!(prompt.release(PermissionStatus::Granted), 1);
        assert_eq!(rx.await, Ok(PermissionStatus::Granted));
    }

    #[tokio::test]
    async fn dropped_reply_reads_as_closed() {
        let (tx, rx) = oneshot::channel::<PermissionStatus>();
        drop(PermissionReply::new(tx));
        assert!(rx.await.is_err());
    }

    #[test]
    fn counts_settings_requests() {
        let prompt = ScriptedPermissionPrompt::always(PermissionStatus::Denied);
        prompt.open_settings();
        prompt.open_settings();
        assert_eq!(prompt.settings_opened(), 2);
    }
}
