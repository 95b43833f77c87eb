//! Mock provider service for testing
//!
//! These are test utilities - not all may be used in current tests but are
//! available for future test development.

#![allow(dead_code)]

use async_trait::async_trait;
use rebasebot::error::{Error, Result};
use rebasebot::platform::{NewPullRequest, ProviderService};
use rebasebot::types::PullRequest;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Call record for `update_pr`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePrCall {
    pub number: u64,
    pub title: Option<String>,
    pub body: Option<String>,
}

/// Simple mock provider for testing
///
/// This manually implements `ProviderService` rather than using a mocking
/// crate, keeping the call records plain data.
///
/// Features:
/// - Auto-incrementing PR numbers
/// - Created PRs become visible to subsequent `list_open_prs` calls
/// - Call tracking for verification
/// - Error injection for failure path testing
pub struct MockProviderService {
    next_pr_number: AtomicU64,
    open_prs: Mutex<Vec<PullRequest>>,
    commit_shas: Mutex<Vec<(u64, Vec<String>)>>,
    list_calls: Mutex<Vec<String>>,
    create_calls: Mutex<Vec<NewPullRequest>>,
    update_calls: Mutex<Vec<UpdatePrCall>>,
    error_on_list: Mutex<Option<String>>,
    error_on_create: Mutex<Option<String>>,
}

impl MockProviderService {
    pub fn new() -> Self {
        Self {
            next_pr_number: AtomicU64::new(1),
            open_prs: Mutex::new(Vec::new()),
            commit_shas: Mutex::new(Vec::new()),
            list_calls: Mutex::new(Vec::new()),
            create_calls: Mutex::new(Vec::new()),
            update_calls: Mutex::new(Vec::new()),
            error_on_list: Mutex::new(None),
            error_on_create: Mutex::new(None),
        }
    }

    /// Seed an open PR the next `list_open_prs` call will return
    pub fn add_open_pr(&self, pr: PullRequest) {
        self.open_prs.lock().unwrap().push(pr);
    }

    /// Seed the commit shas reported for a PR
    pub fn set_pr_commits(&self, number: u64, shas: Vec<String>) {
        self.commit_shas.lock().unwrap().push((number, shas));
    }

    pub fn fail_list(&self, msg: &str) {
        *self.error_on_list.lock().unwrap() = Some(msg.to_string());
    }

    pub fn fail_create(&self, msg: &str) {
        *self.error_on_create.lock().unwrap() = Some(msg.to_string());
    }

    pub fn get_create_calls(&self) -> Vec<NewPullRequest> {
        self.create_calls.lock().unwrap().clone()
    }

    pub fn get_update_calls(&self) -> Vec<UpdatePrCall> {
        self.update_calls.lock().unwrap().clone()
    }

    pub fn get_list_calls(&self) -> Vec<String> {
        self.list_calls.lock().unwrap().clone()
    }

    /// Number of mutating provider calls that were made
    pub fn mutation_count(&self) -> usize {
        self.get_create_calls().len() + self.get_update_calls().len()
    }
}

impl Default for MockProviderService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderService for MockProviderService {
    async fn list_open_prs(&self, base: &str) -> Result<Vec<PullRequest>> {
        self.list_calls.lock().unwrap().push(base.to_string());
        if let Some(msg) = self.error_on_list.lock().unwrap().as_ref() {
            return Err(Error::Platform(msg.clone()));
        }
        Ok(self
            .open_prs
            .lock()
            .unwrap()
            .iter()
            .filter(|pr| pr.base_ref == base)
            .cloned()
            .collect())
    }

    async fn create_pr(&self, req: &NewPullRequest) -> Result<PullRequest> {
        self.create_calls.lock().unwrap().push(req.clone());
        if let Some(msg) = self.error_on_create.lock().unwrap().as_ref() {
            return Err(Error::Platform(msg.clone()));
        }
        let number = self.next_pr_number.fetch_add(1, Ordering::SeqCst);
        let pr = PullRequest {
            number,
            html_url: format!("https://github.com/local/dest/pull/{number}"),
            title: req.title.clone(),
            body: req.body.clone(),
            head_ref: req.head.clone(),
            head_repo: req.head_repo.clone(),
            head_repo_url: String::new(),
            base_ref: req.base.clone(),
            labels: vec![],
        };
        self.open_prs.lock().unwrap().push(pr.clone());
        Ok(pr)
    }

    async fn update_pr(
        &self,
        number: u64,
        title: Option<&str>,
        body: Option<&str>,
    ) -> Result<PullRequest> {
        self.update_calls.lock().unwrap().push(UpdatePrCall {
            number,
            title: title.map(ToString::to_string),
            body: body.map(ToString::to_string),
        });
        let mut prs = self.open_prs.lock().unwrap();
        let pr = prs
            .iter_mut()
            .find(|pr| pr.number == number)
            .ok_or_else(|| Error::Platform(format!("no open PR #{number}")))?;
        if let Some(title) = title {
            pr.title = title.to_string();
        }
        if let Some(body) = body {
            pr.body = body.to_string();
        }
        Ok(pr.clone())
    }

    async fn pr_commit_shas(&self, number: u64) -> Result<Vec<String>> {
        Ok(self
            .commit_shas
            .lock()
            .unwrap()
            .iter()
            .find(|(pr, _)| *pr == number)
            .map(|(_, shas)| shas.clone())
            .unwrap_or_default())
    }
}
