// UTM policy operations
//
// Verification of a UTM policy only depends on the policy itself, so it
// runs without the process-wide verification lock.

use tracing::info;

use super::transaction::Transaction;
use super::{Operation, SyncEngine, SyncOutcome, fetch_lines};
use crate::error::{Error, Result};
use crate::resources::{ResourceOptions, UtmPolicyOptions, plan_update};
use crate::statement::{ConfigLine, ConfigStatement, show_configuration_query};
use crate::traits::DeviceSession;

const KIND: &str = UtmPolicyOptions::KIND;

impl SyncEngine {
    /// Create a UTM policy
    ///
    /// Fails with a conflict if a policy with the same name already exists.
    pub async fn create_utm_policy(
        &self,
        desired: &UtmPolicyOptions,
    ) -> Result<SyncOutcome<UtmPolicyOptions>> {
        let statements = encode_assigned(desired)?;
        self.started(KIND, &desired.name, Operation::Create);

        let session = self.open_session().await?;
        let result = self
            .create_utm_policy_in(&*session, &desired.name, &statements)
            .await;
        session.close().await;

        if result.is_ok() {
            info!("Created {} {}", KIND, desired.name);
        }
        result
    }

    /// Read a UTM policy, `None` when it does not exist
    pub async fn read_utm_policy(&self, name: &str) -> Result<Option<UtmPolicyOptions>> {
        let session = self.open_session().await?;
        let result = read_policy(&*session, name).await;
        session.close().await;
        result
    }

    /// Update a UTM policy to `desired`
    ///
    /// Nothing is committed when the device already matches.
    pub async fn update_utm_policy(
        &self,
        desired: &UtmPolicyOptions,
    ) -> Result<SyncOutcome<UtmPolicyOptions>> {
        encode_assigned(desired)?;
        self.started(KIND, &desired.name, Operation::Update);

        let session = self.open_session().await?;
        let result = self.update_utm_policy_in(&*session, desired).await;
        session.close().await;
        result
    }

    /// Delete a UTM policy
    ///
    /// Deleting a policy that does not exist commits nothing.
    pub async fn delete_utm_policy(&self, name: &str) -> Result<SyncOutcome<UtmPolicyOptions>> {
        self.started(KIND, name, Operation::Delete);

        let session = self.open_session().await?;
        let result = self.delete_utm_policy_in(&*session, name).await;
        session.close().await;
        result
    }

    /// Import an existing UTM policy
    pub async fn import_utm_policy(&self, name: &str) -> Result<UtmPolicyOptions> {
        self.started(KIND, name, Operation::Import);
        self.read_utm_policy(name).await?.ok_or_else(|| {
            Error::not_found(format!(
                "don't find security utm utm-policy with id '{}'",
                name
            ))
        })
    }

    async fn create_utm_policy_in(
        &self,
        session: &dyn DeviceSession,
        name: &str,
        statements: &[ConfigStatement],
    ) -> Result<SyncOutcome<UtmPolicyOptions>> {
        let mut tx = Transaction::begin(session, self.scope(KIND, name)).await?;

        let current = tx.query(&utm_query(name)).await?;
        if !normalize(&current).is_empty() {
            tx.discard("policy already exists").await;
            return Err(Error::conflict(format!(
                "security utm utm-policy {} already exists",
                name
            )));
        }

        tx.apply(statements).await?;
        let receipt = tx.commit(&commit_description(Operation::Create)).await?;

        let mut outcome = SyncOutcome::unchanged(None);
        outcome.record(receipt);
        outcome.options = Some(self.verify_utm_policy(session, name, true).await?);
        Ok(outcome)
    }

    async fn update_utm_policy_in(
        &self,
        session: &dyn DeviceSession,
        desired: &UtmPolicyOptions,
    ) -> Result<SyncOutcome<UtmPolicyOptions>> {
        let name = desired.name.as_str();
        let mut tx = Transaction::begin(session, self.scope(KIND, name)).await?;

        let lines = normalize(&tx.query(&utm_query(name)).await?);
        if lines.is_empty() {
            tx.discard("policy not found").await;
            return Err(Error::not_found(format!(
                "security utm utm-policy {} doesn't exist",
                name
            )));
        }
        let current = tx.or_discard(UtmPolicyOptions::decode(name, &lines)).await?;

        let plan = tx.or_discard(plan_update(&current, desired)).await?;
        if plan.is_empty() {
            tx.discard("no change").await;
            self.unchanged(KIND, name);
            return Ok(SyncOutcome::unchanged(Some(current)));
        }

        tx.apply(&plan).await?;
        let receipt = tx.commit(&commit_description(Operation::Update)).await?;

        let mut outcome = SyncOutcome::unchanged(None);
        outcome.record(receipt);
        outcome.options = Some(self.verify_utm_policy(session, name, true).await?);
        Ok(outcome)
    }

    async fn delete_utm_policy_in(
        &self,
        session: &dyn DeviceSession,
        name: &str,
    ) -> Result<SyncOutcome<UtmPolicyOptions>> {
        let mut tx = Transaction::begin(session, self.scope(KIND, name)).await?;

        if normalize(&tx.query(&utm_query(name)).await?).is_empty() {
            tx.discard("policy already absent").await;
            self.unchanged(KIND, name);
            return Ok(SyncOutcome::unchanged(None));
        }

        tx.apply(&UtmPolicyOptions::removal_statements(name)).await?;
        let receipt = tx.commit(&commit_description(Operation::Delete)).await?;

        let mut outcome = SyncOutcome::unchanged(None);
        outcome.record(receipt);
        self.verify_utm_policy(session, name, false).await?;
        Ok(outcome)
    }

    /// Read back after commit; `expect_present` selects the expected state
    async fn verify_utm_policy(
        &self,
        session: &dyn DeviceSession,
        name: &str,
        expect_present: bool,
    ) -> Result<UtmPolicyOptions> {
        let found = read_policy(session, name).await?;
        match (found, expect_present) {
            (Some(policy), true) => {
                self.verified(KIND, name);
                Ok(policy)
            }
            (None, false) => {
                self.verified(KIND, name);
                Ok(UtmPolicyOptions::new(name))
            }
            (None, true) => Err(self.verification_failed(
                KIND,
                name,
                format!(
                    "security utm utm-policy {} not exists after commit => check your config",
                    name
                ),
            )),
            (Some(_), false) => Err(self.verification_failed(
                KIND,
                name,
                format!(
                    "security utm utm-policy {} still exists after delete => check your config",
                    name
                ),
            )),
        }
    }
}

/// Encode `desired`, rejecting a policy with nothing assigned
fn encode_assigned(desired: &UtmPolicyOptions) -> Result<Vec<ConfigStatement>> {
    let statements = desired.encode()?;
    if statements.is_empty() {
        return Err(Error::validation(format!(
            "security utm utm-policy {} has nothing assigned",
            desired.name
        )));
    }
    Ok(statements)
}

fn utm_query(name: &str) -> String {
    show_configuration_query(&UtmPolicyOptions::config_path(name), true)
}

fn normalize(raw: &str) -> Vec<ConfigLine> {
    UtmPolicyOptions::normalizer().normalize(raw)
}

fn commit_description(operation: Operation) -> String {
    format!("{} resource {}", operation, KIND)
}

async fn read_policy(session: &dyn DeviceSession, name: &str) -> Result<Option<UtmPolicyOptions>> {
    let lines = fetch_lines(
        session,
        &UtmPolicyOptions::config_path(name),
        &UtmPolicyOptions::normalizer(),
    )
    .await?;
    if lines.is_empty() {
        return Ok(None);
    }
    UtmPolicyOptions::decode(name, &lines).map(Some)
}
