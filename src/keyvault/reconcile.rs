//! Reconciliation
//!
//! Compares the observed vault against the desired lifecycle state, picks one
//! [`Action`] and carries it out through a [`VaultApi`].

use super::api::VaultApi;
use super::normalize::normalize;
use super::params::{DesiredConfig, State};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// What a run does to the remote vault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    NoAction,
    Create,
    Update,
    Delete,
}

impl Action {
    /// Decide from presence alone; updates are unconditional and ARM keeps them idempotent
    pub fn decide(observed: Option<&Value>, desired: State) -> Self {
        match (observed, desired) {
            (None, State::Absent) => Action::NoAction,
            (None, State::Present) => Action::Create,
            (Some(_), State::Absent) => Action::Delete,
            (Some(_), State::Present) => Action::Update,
        }
    }

    pub fn is_mutation(self) -> bool {
        !matches!(self, Action::NoAction)
    }
}

/// Result of one reconciliation, printed as the command output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Outcome {
    fn from_resource(changed: bool, resource: Option<&Value>) -> Self {
        Self {
            changed,
            id: resource
                .and_then(|r| r.get("id"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }
    }
}

/// Drives one vault to its desired state
pub struct Reconciler<'a, A: VaultApi> {
    api: &'a A,
    check_mode: bool,
    delete_poll_interval: Duration,
}

impl<'a, A: VaultApi> Reconciler<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self {
            api,
            check_mode: false,
            delete_poll_interval: Duration::from_secs(crate::config::DEFAULT_DELETE_POLL_SECS),
        }
    }

    /// Report what would change without mutating anything
    pub fn check_mode(mut self, enabled: bool) -> Self {
        self.check_mode = enabled;
        self
    }

    pub fn delete_poll_interval(mut self, interval: Duration) -> Self {
        self.delete_poll_interval = interval;
        self
    }

    pub async fn run(&self, config: &DesiredConfig) -> Result<Outcome> {
        let resource_group = config.resource_group.as_str();
        let vault_name = config.vault_name.as_str();

        let payload = normalize(config);

        let observed = self
            .api
            .get_vault(resource_group, vault_name)
            .await
            .context("Error fetching the Key Vault instance")?;

        let action = Action::decide(observed.as_ref(), config.state);
        tracing::info!(
            "Key Vault {}/{}: {} remotely, desired {:?}, action {:?}",
            resource_group,
            vault_name,
            if observed.is_some() { "exists" } else { "absent" },
            config.state,
            action
        );

        if self.check_mode && action.is_mutation() {
            tracing::info!("Check mode, skipping {:?}", action);
            return Ok(Outcome {
                changed: true,
                id: None,
            });
        }

        match action {
            Action::Create | Action::Update => {
                let payload = match payload.location {
                    Some(_) => payload,
                    None => {
                        let location = self
                            .api
                            .resource_group_location(resource_group)
                            .await
                            .with_context(|| {
                                format!("Error looking up resource group {resource_group}")
                            })?;
                        tracing::debug!("Defaulting location to {}", location);
                        payload.with_location(location)
                    }
                };

                let response = self
                    .api
                    .create_or_update_vault(resource_group, vault_name, &payload)
                    .await
                    .context("Error creating the Key Vault instance")?;

                let changed = match &observed {
                    None => true,
                    Some(prior) => *prior != response,
                };
                tracing::info!("Creation / Update done, changed: {}", changed);

                Ok(Outcome::from_resource(changed, Some(&response)))
            }
            Action::Delete => {
                self.api
                    .delete_vault(resource_group, vault_name)
                    .await
                    .context("Error deleting the Key Vault instance")?;

                self.wait_until_gone(resource_group, vault_name).await?;
                tracing::info!("Key Vault instance deleted");

                Ok(Outcome::from_resource(true, None))
            }
            Action::NoAction => {
                tracing::info!("Key Vault instance unchanged");
                Ok(Outcome::from_resource(false, observed.as_ref()))
            }
        }
    }

    /// Deleted vaults can stay visible for a while, so poll until ARM stops
    /// returning them. There is no upper bound.
    async fn wait_until_gone(&self, resource_group: &str, vault_name: &str) -> Result<()> {
        let mut attempt: u32 = 0;
        while self
            .api
            .get_vault(resource_group, vault_name)
            .await
            .context("Error checking Key Vault deletion")?
            .is_some()
        {
            attempt = attempt.saturating_add(1);
            tracing::debug!(
                "Key Vault {} still visible after delete (check {}), sleeping {:?}",
                vault_name,
                attempt,
                self.delete_poll_interval
            );
            tokio::time::sleep(self.delete_poll_interval).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyvault::normalize::RequestPayload;
    use crate::keyvault::params::{Sku, SkuName};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Get,
        CreateOrUpdate(RequestPayload),
        Delete,
        ResourceGroup,
    }

    /// Scripted `get` answers; once exhausted, the last one repeats
    struct FakeApi {
        gets: Mutex<VecDeque<Result<Option<Value>, String>>>,
        last_get: Mutex<Option<Value>>,
        put_result: Result<Value, String>,
        delete_result: Result<(), String>,
        location_result: Result<String, String>,
        calls: Mutex<Vec<Call>>,
    }

    impl FakeApi {
        fn new(gets: Vec<Option<Value>>) -> Self {
            Self {
                gets: Mutex::new(gets.into_iter().map(Ok).collect()),
                last_get: Mutex::new(None),
                put_result: Ok(vault("kv1", "westeurope")),
                delete_result: Ok(()),
                location_result: Ok("westeurope".to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_get(message: &str) -> Self {
            Self::new(Vec::new()).then_failing_get(message)
        }

        fn with_put_result(mut self, result: Result<Value, String>) -> Self {
            self.put_result = result;
            self
        }

        fn with_delete_result(mut self, result: Result<(), String>) -> Self {
            self.delete_result = result;
            self
        }

        fn with_location_result(mut self, result: Result<String, String>) -> Self {
            self.location_result = result;
            self
        }

        /// Queue a failing `get` after the scripted answers
        fn then_failing_get(self, message: &str) -> Self {
            self.gets.lock().unwrap().push_back(Err(message.to_string()));
            self
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn mutations(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::CreateOrUpdate(_) | Call::Delete))
                .count()
        }
    }

    impl VaultApi for FakeApi {
        async fn get_vault(&self, _: &str, _: &str) -> Result<Option<Value>> {
            self.calls.lock().unwrap().push(Call::Get);
            let next = self.gets.lock().unwrap().pop_front();
            match next {
                Some(Ok(value)) => {
                    *self.last_get.lock().unwrap() = value.clone();
                    Ok(value)
                }
                Some(Err(message)) => Err(anyhow::anyhow!(message)),
                None => Ok(self.last_get.lock().unwrap().clone()),
            }
        }

        async fn create_or_update_vault(
            &self,
            _: &str,
            _: &str,
            payload: &RequestPayload,
        ) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::CreateOrUpdate(payload.clone()));
            self.put_result.clone().map_err(|m| anyhow::anyhow!(m))
        }

        async fn delete_vault(&self, _: &str, _: &str) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Delete);
            self.delete_result.clone().map_err(|m| anyhow::anyhow!(m))
        }

        async fn resource_group_location(&self, _: &str) -> Result<String> {
            self.calls.lock().unwrap().push(Call::ResourceGroup);
            self.location_result.clone().map_err(|m| anyhow::anyhow!(m))
        }
    }

    fn vault(name: &str, location: &str) -> Value {
        json!({
            "id": format!("/subscriptions/sub-1/resourceGroups/rg1/providers/Microsoft.KeyVault/vaults/{name}"),
            "name": name,
            "location": location,
            "properties": {"sku": {"family": "A", "name": "standard"}}
        })
    }

    fn desired(state: State) -> DesiredConfig {
        DesiredConfig {
            state,
            ..DesiredConfig::new("rg1", "kv1")
        }
    }

    fn reconciler(api: &FakeApi) -> Reconciler<'_, FakeApi> {
        Reconciler::new(api).delete_poll_interval(Duration::ZERO)
    }

    #[test]
    fn test_decision_table() {
        let existing = json!({"id": "x"});
        assert_eq!(Action::decide(None, State::Absent), Action::NoAction);
        assert_eq!(Action::decide(None, State::Present), Action::Create);
        assert_eq!(Action::decide(Some(&existing), State::Absent), Action::Delete);
        assert_eq!(Action::decide(Some(&existing), State::Present), Action::Update);
    }

    #[tokio::test]
    async fn test_absent_and_absent_is_noop() {
        let api = FakeApi::new(vec![None]);
        let outcome = reconciler(&api).run(&desired(State::Absent)).await.unwrap();

        assert_eq!(outcome, Outcome { changed: false, id: None });
        assert_eq!(api.calls(), vec![Call::Get]);
    }

    #[tokio::test]
    async fn test_create_defaults_location_from_resource_group() {
        let api = FakeApi::new(vec![None]);
        let mut config = desired(State::Present);
        config.sku = Some(Sku {
            family: "A".into(),
            name: SkuName::Standard,
        });

        let outcome = reconciler(&api).run(&config).await.unwrap();
        assert!(outcome.changed);
        assert_eq!(
            outcome.id.as_deref(),
            Some("/subscriptions/sub-1/resourceGroups/rg1/providers/Microsoft.KeyVault/vaults/kv1")
        );

        let calls = api.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1], Call::ResourceGroup);
        match &calls[2] {
            Call::CreateOrUpdate(payload) => {
                assert_eq!(payload.location.as_deref(), Some("westeurope"));
                assert_eq!(
                    payload.properties.as_ref().unwrap().sku,
                    config.sku
                );
            }
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_explicit_location_skips_lookup() {
        let api = FakeApi::new(vec![None]);
        let mut config = desired(State::Present);
        config.location = Some("eastus".into());

        reconciler(&api).run(&config).await.unwrap();

        assert!(!api.calls().contains(&Call::ResourceGroup));
    }

    #[tokio::test]
    async fn test_update_unchanged_when_response_matches() {
        let existing = vault("kv1", "westeurope");
        let api = FakeApi::new(vec![Some(existing.clone())]).with_put_result(Ok(existing));

        let outcome = reconciler(&api).run(&desired(State::Present)).await.unwrap();

        assert!(!outcome.changed);
        assert!(outcome.id.is_some());
        assert_eq!(api.mutations(), 1);
    }

    #[tokio::test]
    async fn test_update_changed_when_response_differs() {
        let mut prior = vault("kv1", "westeurope");
        prior["properties"]["sku"]["name"] = json!("premium");
        let api = FakeApi::new(vec![Some(prior)]);

        let outcome = reconciler(&api).run(&desired(State::Present)).await.unwrap();
        assert!(outcome.changed);
    }

    #[tokio::test]
    async fn test_delete_polls_until_absent() {
        let existing = vault("kv1", "westeurope");
        let api = FakeApi::new(vec![
            Some(existing.clone()),
            Some(existing.clone()),
            Some(existing),
            None,
        ]);

        let outcome = reconciler(&api).run(&desired(State::Absent)).await.unwrap();

        assert_eq!(outcome, Outcome { changed: true, id: None });
        assert_eq!(
            api.calls(),
            vec![Call::Get, Call::Delete, Call::Get, Call::Get, Call::Get]
        );
    }

    #[tokio::test]
    async fn test_check_mode_never_mutates() {
        for (observed, state) in [
            (None, State::Present),
            (Some(vault("kv1", "westeurope")), State::Present),
            (Some(vault("kv1", "westeurope")), State::Absent),
        ] {
            let api = FakeApi::new(vec![observed]);
            let outcome = reconciler(&api)
                .check_mode(true)
                .run(&desired(state))
                .await
                .unwrap();

            assert!(outcome.changed);
            assert_eq!(api.calls(), vec![Call::Get]);
        }

        let api = FakeApi::new(vec![None]);
        let outcome = reconciler(&api)
            .check_mode(true)
            .run(&desired(State::Absent))
            .await
            .unwrap();
        assert!(!outcome.changed);
    }

    #[tokio::test]
    async fn test_get_failure_is_not_treated_as_absent() {
        let api = FakeApi::failing_get("API request failed: 503 Service Unavailable");

        let err = reconciler(&api)
            .run(&desired(State::Present))
            .await
            .unwrap_err();

        assert_eq!(
            format!("{err:#}"),
            "Error fetching the Key Vault instance: API request failed: 503 Service Unavailable"
        );
        assert_eq!(api.mutations(), 0);
    }

    #[tokio::test]
    async fn test_create_failure_carries_cause() {
        let api = FakeApi::new(vec![None])
            .with_put_result(Err("API request failed: 400 Bad Request".into()));

        let err = reconciler(&api)
            .run(&desired(State::Present))
            .await
            .unwrap_err();

        assert_eq!(
            format!("{err:#}"),
            "Error creating the Key Vault instance: API request failed: 400 Bad Request"
        );
    }

    #[tokio::test]
    async fn test_delete_failure_carries_cause() {
        let api = FakeApi::new(vec![Some(vault("kv1", "westeurope"))])
            .with_delete_result(Err("API request failed: 409 Conflict".into()));

        let err = reconciler(&api)
            .run(&desired(State::Absent))
            .await
            .unwrap_err();

        assert_eq!(
            format!("{err:#}"),
            "Error deleting the Key Vault instance: API request failed: 409 Conflict"
        );
        assert_eq!(api.calls(), vec![Call::Get, Call::Delete]);
    }

    #[tokio::test]
    async fn test_failure_while_waiting_for_delete() {
        let api = FakeApi::new(vec![Some(vault("kv1", "westeurope"))])
            .then_failing_get("API request failed: 500 Internal Server Error");

        let err = reconciler(&api)
            .run(&desired(State::Absent))
            .await
            .unwrap_err();

        assert_eq!(
            format!("{err:#}"),
            "Error checking Key Vault deletion: API request failed: 500 Internal Server Error"
        );
        assert_eq!(api.calls(), vec![Call::Get, Call::Delete, Call::Get]);
    }

    #[tokio::test]
    async fn test_resource_group_lookup_failure() {
        let api = FakeApi::new(vec![None])
            .with_location_result(Err("API request failed: 404 Not Found".into()));

        let err = reconciler(&api)
            .run(&desired(State::Present))
            .await
            .unwrap_err();

        assert_eq!(
            format!("{err:#}"),
            "Error looking up resource group rg1: API request failed: 404 Not Found"
        );
        assert_eq!(api.calls(), vec![Call::Get, Call::ResourceGroup]);
        assert_eq!(api.mutations(), 0);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = Outcome { changed: true, id: None };
        assert_eq!(serde_json::to_value(&outcome).unwrap(), json!({"changed": true}));
    }
}
