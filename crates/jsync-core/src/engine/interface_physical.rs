// Physical and aggregated interface operations
//
// Every structural change to an aggregated parent or a member link also
// moves `chassis aggregated-devices ethernet device-count`, computed from a
// full scan of the interface configuration taken inside the transaction.
// Post-commit verification runs under the process-wide verification lock.

use tracing::{debug, info};

use super::transaction::{CommitReceipt, Transaction};
use super::{Operation, SyncEngine, SyncOutcome};
use crate::aggregate::{
    AeName, AggregatedGroupIndex, InterfaceChange, interfaces_query, plan_device_count,
};
use crate::error::{Error, Result};
use crate::lifecycle::{
    InterfaceLifecycleState, classify, inventory_reports_missing, park_statements,
    unpark_statements,
};
use crate::resources::interface_physical::validate_interface_name;
use crate::resources::{InterfacePhysicalOptions, ResourceOptions, plan_update};
use crate::statement::{
    ConfigLine, ConfigStatement, Normalizer, StatementPrefix, show_configuration_query,
    show_interface_query,
};
use crate::traits::DeviceSession;

const KIND: &str = InterfacePhysicalOptions::KIND;

/// Normalized dump of one interface, with and without foreign units
struct InterfaceDump {
    lines: Vec<ConfigLine>,
    unfiltered: Vec<ConfigLine>,
}

impl InterfaceDump {
    fn parse(raw: &str) -> Self {
        Self {
            lines: InterfacePhysicalOptions::normalizer().normalize(raw),
            unfiltered: Normalizer::new().normalize(raw),
        }
    }
}

impl SyncEngine {
    /// Create a physical or aggregated interface
    ///
    /// A parked interface is un-parked first. Physical interfaces must exist
    /// in the device inventory; aggregated ones are allocated through the
    /// device count.
    pub async fn create_interface_physical(
        &self,
        desired: &InterfacePhysicalOptions,
    ) -> Result<SyncOutcome<InterfacePhysicalOptions>> {
        let statements = desired.encode()?;
        self.started(KIND, &desired.name, Operation::Create);

        let session = self.open_session().await?;
        let result = self
            .create_interface_in(&*session, desired, statements)
            .await;
        session.close().await;

        if result.is_ok() {
            info!("Created {} {}", KIND, desired.name);
        }
        result
    }

    /// Read an interface
    ///
    /// `None` when the interface is parked, or has no configuration and is
    /// missing from the inventory.
    pub async fn read_interface_physical(
        &self,
        name: &str,
    ) -> Result<Option<InterfacePhysicalOptions>> {
        validate_interface_name(name)?;

        let session = self.open_session().await?;
        let result = self.read_interface_in(&*session, name).await;
        session.close().await;
        result
    }

    /// Update an interface to `desired`
    ///
    /// Nothing is committed when the device already matches.
    pub async fn update_interface_physical(
        &self,
        desired: &InterfacePhysicalOptions,
    ) -> Result<SyncOutcome<InterfacePhysicalOptions>> {
        desired.encode()?;
        self.started(KIND, &desired.name, Operation::Update);

        let session = self.open_session().await?;
        let result = self.update_interface_in(&*session, desired).await;
        session.close().await;
        result
    }

    /// Delete an interface
    ///
    /// The interface configuration is removed in one commit; unless
    /// `no_disable_on_destroy` is set, an interface still present in the
    /// inventory is then parked in a second commit.
    pub async fn delete_interface_physical(
        &self,
        name: &str,
    ) -> Result<SyncOutcome<InterfacePhysicalOptions>> {
        validate_interface_name(name)?;
        self.started(KIND, name, Operation::Delete);

        let session = self.open_session().await?;
        let result = self.delete_interface_in(&*session, name).await;
        session.close().await;

        if result.is_ok() {
            info!("Deleted {} {}", KIND, name);
        }
        result
    }

    /// Import an existing interface
    ///
    /// Parked interfaces cannot be imported.
    pub async fn import_interface_physical(&self, name: &str) -> Result<InterfacePhysicalOptions> {
        validate_interface_name(name)?;
        self.started(KIND, name, Operation::Import);

        let session = self.open_session().await?;
        let result = self.import_interface_in(&*session, name).await;
        session.close().await;
        result
    }

    async fn import_interface_in(
        &self,
        session: &dyn DeviceSession,
        name: &str,
    ) -> Result<InterfacePhysicalOptions> {
        let dump = InterfaceDump::parse(&query_interface(session, name).await?);
        match classify(&dump.lines, self.interface.deletion_group()) {
            InterfaceLifecycleState::NotConfigured => Err(Error::not_found(format!(
                "interface {} is not configured (disabled with NC)",
                name
            ))),
            InterfaceLifecycleState::Empty if !in_inventory(session, name).await? => Err(
                Error::not_found(format!("don't find interface with id '{}'", name)),
            ),
            _ => InterfacePhysicalOptions::decode(name, &dump.lines),
        }
    }

    async fn read_interface_in(
        &self,
        session: &dyn DeviceSession,
        name: &str,
    ) -> Result<Option<InterfacePhysicalOptions>> {
        let dump = InterfaceDump::parse(&query_interface(session, name).await?);
        match classify(&dump.lines, self.interface.deletion_group()) {
            InterfaceLifecycleState::NotConfigured => Ok(None),
            InterfaceLifecycleState::Empty => {
                if in_inventory(session, name).await? {
                    Ok(Some(InterfacePhysicalOptions::new(name)))
                } else {
                    Ok(None)
                }
            }
            InterfaceLifecycleState::Present => {
                InterfacePhysicalOptions::decode(name, &dump.lines).map(Some)
            }
        }
    }

    async fn create_interface_in(
        &self,
        session: &dyn DeviceSession,
        desired: &InterfacePhysicalOptions,
        encoded: Vec<ConfigStatement>,
    ) -> Result<SyncOutcome<InterfacePhysicalOptions>> {
        let name = desired.name.as_str();
        let group = self.interface.deletion_group();
        let mut tx = Transaction::begin(session, self.scope(KIND, name)).await?;

        let dump = InterfaceDump::parse(&tx.query(&interface_query(name)).await?);
        let mut statements = Vec::new();
        match classify(&dump.lines, group) {
            InterfaceLifecycleState::Present => {
                tx.discard("interface already configured").await;
                return Err(Error::conflict(format!(
                    "interface {} already configured",
                    name
                )));
            }
            InterfaceLifecycleState::NotConfigured => {
                statements.extend(unpark_statements(name, group));
            }
            InterfaceLifecycleState::Empty => {
                let exists = tx.or_discard(in_inventory(session, name).await).await?;
                if !exists && !desired.is_aggregated() {
                    tx.discard("interface not in inventory").await;
                    return Err(Error::not_found(format!(
                        "interface {} doesn't exist on device",
                        name
                    )));
                }
            }
        }
        statements.extend(encoded);

        let binding = tx.or_discard(desired.aggregated_parent()).await?;
        if let Some(count) = self
            .allocate(&tx, name, None, InterfaceChange::Upsert { binding })
            .await?
        {
            statements.push(count);
        }

        tx.apply(&statements).await?;
        let receipt = tx.commit(&commit_description(Operation::Create)).await?;

        let mut outcome = SyncOutcome::unchanged(None);
        outcome.record(receipt);
        outcome.options = Some(self.verify_interface(session, name).await?);
        Ok(outcome)
    }

    async fn update_interface_in(
        &self,
        session: &dyn DeviceSession,
        desired: &InterfacePhysicalOptions,
    ) -> Result<SyncOutcome<InterfacePhysicalOptions>> {
        let name = desired.name.as_str();
        let group = self.interface.deletion_group();
        let mut tx = Transaction::begin(session, self.scope(KIND, name)).await?;

        let dump = InterfaceDump::parse(&tx.query(&interface_query(name)).await?);
        let state = classify(&dump.lines, group);
        if state == InterfaceLifecycleState::Empty
            && !desired.is_aggregated()
            && !tx.or_discard(in_inventory(session, name).await).await?
        {
            tx.discard("interface not in inventory").await;
            return Err(Error::not_found(format!(
                "interface {} doesn't exist on device",
                name
            )));
        }

        let (current, mut statements) = if state == InterfaceLifecycleState::NotConfigured {
            let mut statements = unpark_statements(name, group);
            statements.extend(InterfacePhysicalOptions::removal_statements(name));
            statements.extend(tx.or_discard(desired.encode()).await?);
            (InterfacePhysicalOptions::new(name), statements)
        } else {
            let current = tx
                .or_discard(InterfacePhysicalOptions::decode(name, &dump.lines))
                .await?;
            let plan = tx.or_discard(plan_update(&current, desired)).await?;
            (current, plan)
        };

        if statements.is_empty() {
            tx.discard("no change").await;
            self.unchanged(KIND, name);
            return Ok(SyncOutcome::unchanged(Some(current)));
        }

        let previous = tx.or_discard(current_binding(&current)).await?;
        let binding = tx.or_discard(desired.aggregated_parent()).await?;
        if let Some(count) = self
            .allocate(&tx, name, previous, InterfaceChange::Upsert { binding })
            .await?
        {
            statements.push(count);
        }

        tx.apply(&statements).await?;
        let receipt = tx.commit(&commit_description(Operation::Update)).await?;

        let mut outcome = SyncOutcome::unchanged(None);
        outcome.record(receipt);
        outcome.options = Some(self.verify_interface(session, name).await?);
        Ok(outcome)
    }

    async fn delete_interface_in(
        &self,
        session: &dyn DeviceSession,
        name: &str,
    ) -> Result<SyncOutcome<InterfacePhysicalOptions>> {
        let group = self.interface.deletion_group();
        let mut tx = Transaction::begin(session, self.scope(KIND, name)).await?;

        let dump = InterfaceDump::parse(&tx.query(&interface_query(name)).await?);
        if InterfacePhysicalOptions::has_foreign_units(&dump.unfiltered) {
            tx.discard("interface carries logical units").await;
            return Err(Error::conflict(format!(
                "interface {} is used for a logical unit interface",
                name
            )));
        }
        if classify(&dump.lines, group) == InterfaceLifecycleState::NotConfigured {
            tx.discard("interface already parked").await;
            self.unchanged(KIND, name);
            return Ok(SyncOutcome::unchanged(None));
        }

        let current = tx
            .or_discard(InterfacePhysicalOptions::decode(name, &dump.lines))
            .await?;
        let previous = tx.or_discard(current_binding(&current)).await?;

        let mut statements =
            vec![StatementPrefix::new(InterfacePhysicalOptions::config_path(name)).delete_all()];
        if let Some(count) = self
            .allocate(&tx, name, previous, InterfaceChange::Delete)
            .await?
        {
            statements.push(count);
        }

        tx.apply(&statements).await?;
        let receipt = tx.commit(&commit_description(Operation::Delete)).await?;
        let mut outcome = SyncOutcome::unchanged(None);
        outcome.record(receipt);

        let parked = {
            let _verify = self.verification_region().await;
            let dump = InterfaceDump::parse(&query_interface(session, name).await?);
            if classify(&dump.lines, group) != InterfaceLifecycleState::Empty {
                return Err(self.verification_failed(
                    KIND,
                    name,
                    format!(
                        "interface {} still configured after delete => check your config",
                        name
                    ),
                ));
            }
            self.verified(KIND, name);

            !self.interface.no_disable_on_destroy && in_inventory(session, name).await?
        };

        if parked {
            if let Some(receipt) = self.park_interface(session, name).await? {
                outcome.record(receipt);
            }
        }

        Ok(outcome)
    }

    /// Park `name` in its own transaction
    ///
    /// The device lock was released by the delete commit, so the interface
    /// is read again under the new lock and parked only if still empty.
    async fn park_interface(
        &self,
        session: &dyn DeviceSession,
        name: &str,
    ) -> Result<Option<CommitReceipt>> {
        let group = self.interface.deletion_group();
        let mut tx = Transaction::begin(session, self.scope(KIND, name)).await?;

        let dump = InterfaceDump::parse(&tx.query(&interface_query(name)).await?);
        let state = if InterfacePhysicalOptions::has_foreign_units(&dump.unfiltered) {
            InterfaceLifecycleState::Present
        } else {
            classify(&dump.lines, group)
        };
        match state {
            InterfaceLifecycleState::Empty => {
                tx.apply(&park_statements(name, group)).await?;
                let receipt = tx.commit(&format!("disable(NC) resource {}", KIND)).await?;
                debug!("Parked interface {}", name);
                Ok(Some(receipt))
            }
            InterfaceLifecycleState::NotConfigured => {
                tx.discard("interface already parked").await;
                Ok(None)
            }
            InterfaceLifecycleState::Present => {
                tx.discard("interface configured again before parking").await;
                Err(self.verification_failed(
                    KIND,
                    name,
                    format!(
                        "interface {} configured by another operation before disable (NC) => check your config",
                        name
                    ),
                ))
            }
        }
    }

    /// Device-count statement required by `change`, from a fresh full scan
    async fn allocate(
        &self,
        tx: &Transaction<'_>,
        name: &str,
        previous: Option<AeName>,
        change: InterfaceChange,
    ) -> Result<Option<ConfigStatement>> {
        let touches_aggregate = AeName::parse(name).is_some()
            || previous.is_some()
            || matches!(change, InterfaceChange::Upsert { binding: Some(_) });
        if !touches_aggregate {
            return Ok(None);
        }

        let index = AggregatedGroupIndex::scan(&tx.query(&interfaces_query()).await?);
        let statement = plan_device_count(&index, name, previous, change);
        if let Some(statement) = &statement {
            debug!("Device count for {}: {}", name, statement);
        }
        Ok(statement)
    }

    /// Read back after create/update under the verification lock
    async fn verify_interface(
        &self,
        session: &dyn DeviceSession,
        name: &str,
    ) -> Result<InterfacePhysicalOptions> {
        let _verify = self.verification_region().await;

        let dump = InterfaceDump::parse(&query_interface(session, name).await?);
        match classify(&dump.lines, self.interface.deletion_group()) {
            InterfaceLifecycleState::NotConfigured => Err(self.verification_failed(
                KIND,
                name,
                format!(
                    "interface {} always disable (NC) after commit => check your config",
                    name
                ),
            )),
            InterfaceLifecycleState::Empty if !in_inventory(session, name).await? => {
                Err(self.verification_failed(
                    KIND,
                    name,
                    format!(
                        "interface {} not exists and config can't found after commit => check your config",
                        name
                    ),
                ))
            }
            _ => {
                let options = InterfacePhysicalOptions::decode(name, &dump.lines)?;
                self.verified(KIND, name);
                Ok(options)
            }
        }
    }
}

fn interface_query(name: &str) -> String {
    show_configuration_query(&InterfacePhysicalOptions::config_path(name), true)
}

async fn query_interface(session: &dyn DeviceSession, name: &str) -> Result<String> {
    session.run_query(&interface_query(name)).await
}

async fn in_inventory(session: &dyn DeviceSession, name: &str) -> Result<bool> {
    let reply = session.run_query(&show_interface_query(name)).await?;
    Ok(!inventory_reports_missing(&reply))
}

/// Parent `current` is bound to on the device
fn current_binding(current: &InterfacePhysicalOptions) -> Result<Option<AeName>> {
    current.aggregated_parent().map_err(|e| {
        Error::validation(format!(
            "interface {} on device has an unusable 802.3ad binding: {}",
            current.name, e
        ))
    })
}

fn commit_description(operation: Operation) -> String {
    format!("{} resource {}", operation, KIND)
}
