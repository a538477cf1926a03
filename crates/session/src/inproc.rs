//! In-process scripted session adapter.
//!
//! Stands in for the remote-browser gateway in tests and local
//! development: a session walks through a fixed script of state pages,
//! advancing one page per performed action, and renders a synthetic frame
//! per page (so preview dedup has something realistic to chew on).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use autopub_core::action::Action;
use autopub_core::session::{
    bound_state, SessionError, SessionHandle, SessionProvider, Stoppable, MAX_STATE_CHARS,
};

/// The fixed walk a scripted session takes.
#[derive(Debug, Clone)]
pub struct SessionScript {
    /// State descriptions, one per page. `perform` advances to the next
    /// page until the last one is reached.
    pub pages: Vec<String>,
    /// Actions on these targets fail with `ActionFailed`.
    pub fail_targets: Vec<String>,
}

impl Default for SessionScript {
    fn default() -> Self {
        Self {
            pages: vec!["form: empty".to_string(), "form: filled".to_string()],
            fail_targets: Vec::new(),
        }
    }
}

struct Inner {
    page: usize,
    performed: Vec<Action>,
    stopped: bool,
}

/// One scripted session.
pub struct InProcSession {
    resource_id: String,
    script: SessionScript,
    inner: Mutex<Inner>,
}

impl InProcSession {
    pub fn new(resource_id: impl Into<String>, script: SessionScript) -> Self {
        Self {
            resource_id: resource_id.into(),
            script,
            inner: Mutex::new(Inner {
                page: 0,
                performed: Vec::new(),
                stopped: false,
            }),
        }
    }

    /// Actions performed so far, in order.
    pub fn performed(&self) -> Vec<Action> {
        self.inner.lock().expect("session mutex poisoned").performed.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock().expect("session mutex poisoned").stopped
    }

    pub fn current_page(&self) -> usize {
        self.inner.lock().expect("session mutex poisoned").page
    }
}

#[async_trait]
impl Stoppable for InProcSession {
    async fn stop(&self) {
        self.inner.lock().expect("session mutex poisoned").stopped = true;
    }
}

#[async_trait]
impl SessionHandle for InProcSession {
    fn resource_id(&self) -> &str {
        &self.resource_id
    }

    async fn capture_frame(&self) -> Vec<u8> {
        let inner = self.inner.lock().expect("session mutex poisoned");
        if inner.stopped {
            return Vec::new();
        }
        format!("frame:{}:{}", self.resource_id, inner.page).into_bytes()
    }

    async fn capture_state(&self) -> String {
        let inner = self.inner.lock().expect("session mutex poisoned");
        if inner.stopped {
            return String::new();
        }
        let page = self
            .script
            .pages
            .get(inner.page)
            .map(String::as_str)
            .unwrap_or("");
        bound_state(page, MAX_STATE_CHARS)
    }

    async fn perform(&self, action: &Action) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().expect("session mutex poisoned");
        if inner.stopped {
            return Err(SessionError::ActionFailed("session stopped".to_string()));
        }
        if let Some(target) = &action.target {
            if self.script.fail_targets.contains(target) {
                return Err(SessionError::ActionFailed(format!(
                    "scripted failure on '{target}'"
                )));
            }
        }
        inner.performed.push(action.clone());
        if inner.page + 1 < self.script.pages.len() {
            inner.page += 1;
        }
        Ok(())
    }
}

/// Provisions [`InProcSession`]s and keeps the last one per resource id so
/// tests can inspect it.
pub struct InProcProvider {
    script: SessionScript,
    sessions: Mutex<HashMap<String, Arc<InProcSession>>>,
}

impl InProcProvider {
    pub fn new(script: SessionScript) -> Self {
        Self {
            script,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The most recently opened session for `resource_id`, if any.
    pub fn session(&self, resource_id: &str) -> Option<Arc<InProcSession>> {
        self.sessions
            .lock()
            .expect("provider mutex poisoned")
            .get(resource_id)
            .cloned()
    }
}

impl Default for InProcProvider {
    fn default() -> Self {
        Self::new(SessionScript::default())
    }
}

#[async_trait]
impl SessionProvider for InProcProvider {
    async fn open(&self, resource_id: &str) -> Result<Arc<dyn SessionHandle>, SessionError> {
        let session = Arc::new(InProcSession::new(resource_id, self.script.clone()));
        self.sessions
            .lock()
            .expect("provider mutex poisoned")
            .insert(resource_id.to_string(), Arc::clone(&session));
        Ok(session)
    }
}
