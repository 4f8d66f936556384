use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use scan_core::PermissionStatus;
use scan_platform::{PermissionPrompt, PermissionReply};
use tokio::sync::{oneshot, watch};
use tracing::debug;

#[derive(Debug, Clone)]
enum GateState {
    Idle,
    Pending(watch::Receiver<Option<PermissionStatus>>),
    Resolved(PermissionStatus),
}

/// Camera permission gate with at most one outstanding OS prompt.
///
/// Concurrent callers share the pending prompt. A grant is cached; a denial is not
/// retried automatically, but calling again after a denial shows a fresh prompt.
#[derive(Clone)]
pub struct PermissionGate {
    prompt: Arc<dyn PermissionPrompt>,
    state: Arc<Mutex<GateState>>,
}

impl PermissionGate {
    pub fn new(prompt: Arc<dyn PermissionPrompt>) -> Self {
        Self {
            prompt,
            state: Arc::new(Mutex::new(GateState::Idle)),
        }
    }

    /// Last resolved status, `None` while idle or pending.
    pub fn status(&self) -> Option<PermissionStatus> {
        match &*self.lock_state() {
            GateState::Resolved(status) => Some(*status),
            GateState::Idle | GateState::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(&*self.lock_state(), GateState::Pending(_))
    }

    /// Resolve camera permission, prompting only when nothing usable is known.
    pub async fn request_permission(&self) -> PermissionStatus {
        let (mut rx, reply) = {
            let mut state = self.lock_state();
            let pending = match &*state {
                GateState::Resolved(PermissionStatus::Granted) => {
                    return PermissionStatus::Granted;
                }
                GateState::Pending(rx) => Some(rx.clone()),
                GateState::Idle | GateState::Resolved(PermissionStatus::Denied) => None,
            };
            match pending {
                Some(rx) => (rx, None),
                None => {
                    let (status_tx, status_rx) = watch::channel(None);
                    let (reply_tx, reply_rx) = oneshot::channel();
                    *state = GateState::Pending(status_rx.clone());
                    self.spawn_resolver(reply_rx, status_tx);
                    (status_rx, Some(PermissionReply::new(reply_tx)))
                }
            }
        };

        if let Some(reply) = reply {
            debug!("showing camera permission prompt");
            self.prompt.request_camera_permission(reply);
        }

        match rx.wait_for(Option::is_some).await {
            Ok(status) => (*status).unwrap_or(PermissionStatus::Denied),
            Err(_) => PermissionStatus::Denied,
        }
    }

    /// Forward to the platform settings page so the user can grant access.
    pub fn open_settings(&self) {
        self.prompt.open_settings();
    }

    fn spawn_resolver(
        &self,
        reply_rx: oneshot::Receiver<PermissionStatus>,
        status_tx: watch::Sender<Option<PermissionStatus>>,
    ) {
        let state = self.state.clone();
        tokio::spawn(async move {
            // An abandoned prompt reads as a denial.
            let status = reply_rx.await.unwrap_or(PermissionStatus::Denied);
            debug!(?status, "camera permission resolved");
            *state.lock().unwrap_or_else(PoisonError::into_inner) = GateState::Resolved(status);
            let _ = status_tx.send(Some(status));
        });
    }

    fn lock_state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use scan_platform::ScriptedPermissionPrompt;
    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn concurrent_requests_share_one_prompt() {
        let prompt = ScriptedPermissionPrompt::manual();
        let gate = PermissionGate::new(Arc::new(prompt.clone()));

        let a = tokio::spawn({
            let gate = gate.clone();
            async move { gate.request_permission().await }
        });
        let b = tokio::spawn({
            let gate = gate.clone();
            async move { gate.request_permission().await }
        });

        timeout(Duration::from_secs(2), async {
            while prompt.prompt_count() == 0 || !gate.is_pending() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("prompt should be shown");
        tokio::task::yield_now().await;

        assert_eq!(prompt.release(PermissionStatus::Granted), 1);
        let a = timeout(Duration::from_secs(2), a)
            .await
            .expect("a timeout")
            .expect("a join");
        let b = timeout(Duration::from_secs(2), b)
            .await
            .expect("b timeout")
            .expect("b join");

        assert_eq!(a, PermissionStatus::Granted);
        assert_eq!(b, PermissionStatus::Granted);
        assert_eq!(prompt.prompt_count(), 1);
    }

    #[tokio::test]
    async fn caches_grant() {
        let prompt = ScriptedPermissionPrompt::always(PermissionStatus::Granted);
        let gate = PermissionGate::new(Arc::new(prompt.clone()));

        assert_eq!(gate.request_permission().await, PermissionStatus::Granted);
        assert_eq!(gate.request_permission().await, PermissionStatus::Granted);
        assert_eq!(gate.status(), Some(PermissionStatus::Granted));
        assert_eq!(prompt.prompt_count(), 1);
    }

    #[tokio::test]
    async fn re_prompts_after_denial() {
        let prompt = ScriptedPermissionPrompt::with_answers([
            PermissionStatus::Denied,
            PermissionStatus::Granted,
        ]);
        let gate = PermissionGate::new(Arc::new(prompt.clone()));

        assert_eq!(gate.request_permission().await, PermissionStatus::Denied);
        assert_eq!(gate.status(), Some(PermissionStatus::Denied));

        assert_eq!(gate.request_permission().await, PermissionStatus::Granted);
        assert_eq!(prompt.prompt_count(), 2);
    }

    #[tokio::test]
    async fn forwards_settings_requests() {
        let prompt = ScriptedPermissionPrompt::always(PermissionStatus::Denied);
        let gate = PermissionGate::new(Arc::new(prompt.clone()));
        gate.open_settings();
        assert_eq!(prompt.settings_opened(), 1);
    }
}
