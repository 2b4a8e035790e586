use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockmove_core::{
    Actor, Aggregate, AggregateId, AggregateRoot, DomainError, Entity, TransactionId,
    TransactionItemId, ValueObject,
};
use stockmove_events::Event;
use stockmove_inventory::{EquipmentId, ItemTypeId, StockLocation, WarehouseId};

use crate::acceptance::{LineOutcome, ReceiptReport, reconcile};
use crate::batch::BatchNumber;

/// Aggregate type recorded on ledger envelopes.
pub const TRANSACTION_AGGREGATE_TYPE: &str = "transfer.transaction";

/// One side of a transfer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Party {
    Warehouse(WarehouseId),
    Equipment(EquipmentId),
}

impl Party {
    /// Where goods received by this party end up.
    pub fn location(self) -> StockLocation {
        match self {
            Party::Warehouse(id) => StockLocation::Warehouse(id),
            Party::Equipment(id) => StockLocation::Equipment(id),
        }
    }

    /// Identity used when probing batch numbers.
    pub fn entity_id(self) -> AggregateId {
        match self {
            Party::Warehouse(id) => id.0,
            Party::Equipment(id) => id.0,
        }
    }

    pub fn is_equipment(self) -> bool {
        matches!(self, Party::Equipment(_))
    }
}

impl ValueObject for Party {}

impl core::fmt::Display for Party {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.location(), f)
    }
}

/// Status of a transaction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Accepted,
    Rejected,
    Resolving,
    Resolved,
}

impl TransactionStatus {
    /// Nothing left to do: every line matched, or every discrepancy is closed.
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionStatus::Accepted | TransactionStatus::Resolved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Accepted => "ACCEPTED",
            TransactionStatus::Rejected => "REJECTED",
            TransactionStatus::Resolving => "RESOLVING",
            TransactionStatus::Resolved => "RESOLVED",
        }
    }
}

impl core::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one requested line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineStatus {
    Pending,
    Accepted,
    Rejected,
    Resolving,
    Resolved,
}

impl LineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LineStatus::Pending => "PENDING",
            LineStatus::Accepted => "ACCEPTED",
            LineStatus::Rejected => "REJECTED",
            LineStatus::Resolving => "RESOLVING",
            LineStatus::Resolved => "RESOLVED",
        }
    }
}

impl core::fmt::Display for LineStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the goods are for. Decided by the receiving side at acceptance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Purpose {
    General,
    Consumable,
    Maintenance,
}

impl core::str::FromStr for Purpose {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GENERAL" => Ok(Purpose::General),
            "CONSUMABLE" => Ok(Purpose::Consumable),
            "MAINTENANCE" => Ok(Purpose::Maintenance),
            other => Err(DomainError::validation(format!("unknown purpose '{other}'"))),
        }
    }
}

/// Which side declared the transfer first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitiatingParty {
    Sender,
    Receiver,
}

/// Maintenance record owned by the maintenance subsystem.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaintenanceRecordId(pub AggregateId);

impl MaintenanceRecordId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MaintenanceRecordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A requested line as it appears in commands and events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedLine {
    pub line_id: TransactionItemId,
    pub item_type: ItemTypeId,
    pub quantity: i64,
}

/// One requested line within a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionItem {
    id: TransactionItemId,
    item_type: ItemTypeId,
    quantity: i64,
    status: LineStatus,
    rejection_reason: Option<String>,
}

impl TransactionItem {
    fn requested(line: &RequestedLine) -> Self {
        Self {
            id: line.line_id,
            item_type: line.item_type,
            quantity: line.quantity,
            status: LineStatus::Pending,
            rejection_reason: None,
        }
    }

    pub fn id_typed(&self) -> TransactionItemId {
        self.id
    }

    pub fn item_type(&self) -> ItemTypeId {
        self.item_type
    }

    /// Requested quantity.
    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn status(&self) -> LineStatus {
        self.status
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }
}

impl Entity for TransactionItem {
    type Id = TransactionItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Aggregate root: Transaction (one intended transfer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    id: TransactionId,
    created_at: DateTime<Utc>,
    transfer_date: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    status: TransactionStatus,
    rejection_reason: Option<String>,
    acceptance_comment: Option<String>,
    created_by: Actor,
    approved_by: Option<Actor>,
    sender: Party,
    receiver: Party,
    batch_number: Option<BatchNumber>,
    initiated_by: InitiatingParty,
    requested_purpose: Option<Purpose>,
    purpose: Option<Purpose>,
    maintenance_record: Option<MaintenanceRecordId>,
    lines: Vec<TransactionItem>,
    version: u64,
}

impl Transaction {
    /// Build the aggregate from its creation event (version 1).
    pub fn from_created(e: &TransactionCreated) -> Self {
        Self {
            id: e.transaction_id,
            created_at: e.occurred_at,
            transfer_date: e.transfer_date,
            completed_at: None,
            status: TransactionStatus::Pending,
            rejection_reason: None,
            acceptance_comment: None,
            created_by: e.created_by.clone(),
            approved_by: None,
            sender: e.sender,
            receiver: e.receiver,
            batch_number: e.batch_number,
            initiated_by: e.initiated_by,
            requested_purpose: e.requested_purpose,
            purpose: None,
            maintenance_record: None,
            lines: e.lines.iter().map(TransactionItem::requested).collect(),
            version: 1,
        }
    }

    /// Rehydrate from a full event history (first event must be the creation).
    pub fn from_history<'a>(
        events: impl IntoIterator<Item = &'a TransferEvent>,
    ) -> Result<Self, DomainError> {
        let mut events = events.into_iter();
        let mut tx = match events.next() {
            Some(TransferEvent::TransactionCreated(e)) => Self::from_created(e),
            Some(other) => {
                return Err(DomainError::invalid_state(
                    "transaction history",
                    "to start with transfer.transaction.created",
                    other.event_type(),
                ));
            }
            None => return Err(DomainError::not_found("transaction history is empty")),
        };
        for e in events {
            tx.apply(e);
        }
        Ok(tx)
    }

    /// Decide the creation of a new transaction.
    pub fn handle_create(cmd: &CreateTransaction) -> Result<Vec<TransferEvent>, DomainError> {
        if cmd.sender == cmd.receiver {
            return Err(DomainError::validation("sender and receiver must differ"));
        }
        validate_lines(&cmd.lines)?;

        Ok(vec![TransferEvent::TransactionCreated(TransactionCreated {
            transaction_id: cmd.transaction_id,
            sender: cmd.sender,
            receiver: cmd.receiver,
            lines: cmd.lines.clone(),
            transfer_date: cmd.transfer_date,
            batch_number: cmd.batch_number,
            initiated_by: cmd.initiated_by,
            requested_purpose: cmd.purpose_hint,
            created_by: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    pub fn id_typed(&self) -> TransactionId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn transfer_date(&self) -> DateTime<Utc> {
        self.transfer_date
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn acceptance_comment(&self) -> Option<&str> {
        self.acceptance_comment.as_deref()
    }

    pub fn created_by(&self) -> &Actor {
        &self.created_by
    }

    pub fn approved_by(&self) -> Option<&Actor> {
        self.approved_by.as_ref()
    }

    pub fn sender(&self) -> Party {
        self.sender
    }

    pub fn receiver(&self) -> Party {
        self.receiver
    }

    pub fn batch_number(&self) -> Option<BatchNumber> {
        self.batch_number
    }

    pub fn initiated_by(&self) -> InitiatingParty {
        self.initiated_by
    }

    /// The creator's advisory guess; never becomes the purpose by itself.
    pub fn requested_purpose(&self) -> Option<Purpose> {
        self.requested_purpose
    }

    /// Set exactly once, when the receiving side reconciles the transfer.
    pub fn purpose(&self) -> Option<Purpose> {
        self.purpose
    }

    pub fn maintenance_record(&self) -> Option<MaintenanceRecordId> {
        self.maintenance_record
    }

    pub fn lines(&self) -> &[TransactionItem] {
        &self.lines
    }

    pub fn line(&self, line_id: TransactionItemId) -> Option<&TransactionItem> {
        self.lines.iter().find(|l| l.id == line_id)
    }

    /// Whether `entity` (a warehouse or equipment id) is one of the two parties.
    pub fn involves(&self, entity: AggregateId) -> bool {
        self.sender.entity_id() == entity || self.receiver.entity_id() == entity
    }
}

impl AggregateRoot for Transaction {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateTransaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransaction {
    pub transaction_id: TransactionId,
    pub sender: Party,
    pub receiver: Party,
    pub lines: Vec<RequestedLine>,
    pub transfer_date: DateTime<Utc>,
    pub actor: Actor,
    pub batch_number: Option<BatchNumber>,
    pub initiated_by: InitiatingParty,
    pub purpose_hint: Option<Purpose>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateTransaction (only while PENDING; lines are replaced wholesale).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTransaction {
    pub transaction_id: TransactionId,
    pub lines: Vec<RequestedLine>,
    pub transfer_date: DateTime<Utc>,
    pub batch_number: Option<BatchNumber>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: LinkMaintenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMaintenance {
    pub transaction_id: TransactionId,
    pub record_id: MaintenanceRecordId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AcceptTransaction (the receiver reports what actually arrived).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptTransaction {
    pub transaction_id: TransactionId,
    pub received: BTreeMap<TransactionItemId, i64>,
    pub not_received: BTreeMap<TransactionItemId, bool>,
    pub actor: Actor,
    pub comment: String,
    pub purpose: Option<Purpose>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectTransaction (the receiver refuses the whole transfer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectTransaction {
    pub transaction_id: TransactionId,
    pub reason: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ResolveLine (a discrepancy raised by this line was closed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveLine {
    pub transaction_id: TransactionId,
    pub line_id: TransactionItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferCommand {
    Create(CreateTransaction),
    Update(UpdateTransaction),
    LinkMaintenance(LinkMaintenance),
    Accept(AcceptTransaction),
    Reject(RejectTransaction),
    ResolveLine(ResolveLine),
}

/// Event: TransactionCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCreated {
    pub transaction_id: TransactionId,
    pub sender: Party,
    pub receiver: Party,
    pub lines: Vec<RequestedLine>,
    pub transfer_date: DateTime<Utc>,
    pub batch_number: Option<BatchNumber>,
    pub initiated_by: InitiatingParty,
    pub requested_purpose: Option<Purpose>,
    pub created_by: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransactionUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionUpdated {
    pub transaction_id: TransactionId,
    pub lines: Vec<RequestedLine>,
    pub transfer_date: DateTime<Utc>,
    /// Batch number held before the update (released if it differs).
    pub previous_batch_number: Option<BatchNumber>,
    pub batch_number: Option<BatchNumber>,
    pub updated_by: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MaintenanceLinked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceLinked {
    pub transaction_id: TransactionId,
    pub record_id: MaintenanceRecordId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransactionReconciled.
///
/// The receiver's report has been classified line by line. `status` is
/// ACCEPTED only when every line matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReconciled {
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
    pub outcomes: Vec<LineOutcome>,
    pub purpose: Purpose,
    pub acceptance_comment: Option<String>,
    pub rejection_reason: Option<String>,
    pub approved_by: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransactionRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRejected {
    pub transaction_id: TransactionId,
    pub reason: String,
    pub rejected_by: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineResolved. Carries the rolled-up transaction status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineResolved {
    pub transaction_id: TransactionId,
    pub line_id: TransactionItemId,
    pub transaction_status: TransactionStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEvent {
    TransactionCreated(TransactionCreated),
    TransactionUpdated(TransactionUpdated),
    MaintenanceLinked(MaintenanceLinked),
    TransactionReconciled(TransactionReconciled),
    TransactionRejected(TransactionRejected),
    LineResolved(LineResolved),
}

impl TransferEvent {
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            TransferEvent::TransactionCreated(e) => e.transaction_id,
            TransferEvent::TransactionUpdated(e) => e.transaction_id,
            TransferEvent::MaintenanceLinked(e) => e.transaction_id,
            TransferEvent::TransactionReconciled(e) => e.transaction_id,
            TransferEvent::TransactionRejected(e) => e.transaction_id,
            TransferEvent::LineResolved(e) => e.transaction_id,
        }
    }
}

impl Event for TransferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransferEvent::TransactionCreated(_) => "transfer.transaction.created",
            TransferEvent::TransactionUpdated(_) => "transfer.transaction.updated",
            TransferEvent::MaintenanceLinked(_) => "transfer.transaction.maintenance_linked",
            TransferEvent::TransactionReconciled(_) => "transfer.transaction.reconciled",
            TransferEvent::TransactionRejected(_) => "transfer.transaction.rejected",
            TransferEvent::LineResolved(_) => "transfer.transaction.line_resolved",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransferEvent::TransactionCreated(e) => e.occurred_at,
            TransferEvent::TransactionUpdated(e) => e.occurred_at,
            TransferEvent::MaintenanceLinked(e) => e.occurred_at,
            TransferEvent::TransactionReconciled(e) => e.occurred_at,
            TransferEvent::TransactionRejected(e) => e.occurred_at,
            TransferEvent::LineResolved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Transaction {
    type Command = TransferCommand;
    type Event = TransferEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransferEvent::TransactionCreated(e) => {
                let version = self.version;
                *self = Self::from_created(e);
                self.version = version;
            }
            TransferEvent::TransactionUpdated(e) => {
                self.lines = e.lines.iter().map(TransactionItem::requested).collect();
                self.transfer_date = e.transfer_date;
                self.batch_number = e.batch_number;
            }
            TransferEvent::MaintenanceLinked(e) => {
                self.maintenance_record = Some(e.record_id);
            }
            TransferEvent::TransactionReconciled(e) => {
                for outcome in &e.outcomes {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.id == outcome.line_id) {
                        line.status = outcome.status;
                        line.rejection_reason = outcome.reason.clone();
                    }
                }
                self.status = e.status;
                self.purpose = Some(e.purpose);
                self.acceptance_comment = e.acceptance_comment.clone();
                self.rejection_reason = e.rejection_reason.clone();
                self.approved_by = Some(e.approved_by.clone());
                self.completed_at = Some(e.occurred_at);
            }
            TransferEvent::TransactionRejected(e) => {
                for line in &mut self.lines {
                    line.status = LineStatus::Rejected;
                    line.rejection_reason = Some(e.reason.clone());
                }
                self.status = TransactionStatus::Rejected;
                self.rejection_reason = Some(e.reason.clone());
                self.approved_by = Some(e.rejected_by.clone());
                self.completed_at = Some(e.occurred_at);
            }
            TransferEvent::LineResolved(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.id == e.line_id) {
                    line.status = LineStatus::Resolved;
                    line.rejection_reason = None;
                }
                self.status = e.transaction_status;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransferCommand::Create(cmd) => Err(DomainError::conflict(format!(
                "transaction {} already exists",
                cmd.transaction_id
            ))),
            TransferCommand::Update(cmd) => self.handle_update(cmd),
            TransferCommand::LinkMaintenance(cmd) => self.handle_link(cmd),
            TransferCommand::Accept(cmd) => self.handle_accept(cmd),
            TransferCommand::Reject(cmd) => self.handle_reject(cmd),
            TransferCommand::ResolveLine(cmd) => self.handle_resolve_line(cmd),
        }
    }
}

fn validate_lines(lines: &[RequestedLine]) -> Result<(), DomainError> {
    if lines.is_empty() {
        return Err(DomainError::validation("a transaction needs at least one item"));
    }
    for (idx, line) in lines.iter().enumerate() {
        if line.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "item {idx} ({}): quantity must be positive, got {}",
                line.item_type, line.quantity
            )));
        }
    }
    let mut ids: Vec<_> = lines.iter().map(|l| l.line_id).collect();
    ids.sort();
    ids.dedup();
    if ids.len() != lines.len() {
        return Err(DomainError::validation("duplicate line id"));
    }
    Ok(())
}

impl Transaction {
    fn ensure_transaction_id(&self, transaction_id: TransactionId) -> Result<(), DomainError> {
        if self.id != transaction_id {
            return Err(DomainError::validation(format!(
                "command targets transaction {transaction_id}, loaded {}",
                self.id
            )));
        }
        Ok(())
    }

    fn ensure_pending(&self, operation: &str) -> Result<(), DomainError> {
        if self.status != TransactionStatus::Pending {
            return Err(DomainError::invalid_state(
                format!("transaction {} ({operation})", self.id),
                TransactionStatus::Pending.as_str(),
                self.status.as_str(),
            ));
        }
        Ok(())
    }

    /// Concluding twice is a conflict, not a state error: the caller raced another operator.
    fn ensure_not_concluded(&self) -> Result<(), DomainError> {
        if self.status != TransactionStatus::Pending {
            return Err(DomainError::conflict(format!(
                "transaction {} was already concluded with status {}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    fn handle_update(&self, cmd: &UpdateTransaction) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_transaction_id(cmd.transaction_id)?;
        self.ensure_pending("update")?;
        validate_lines(&cmd.lines)?;

        Ok(vec![TransferEvent::TransactionUpdated(TransactionUpdated {
            transaction_id: cmd.transaction_id,
            lines: cmd.lines.clone(),
            transfer_date: cmd.transfer_date,
            previous_batch_number: self.batch_number,
            batch_number: cmd.batch_number,
            updated_by: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_link(&self, cmd: &LinkMaintenance) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_transaction_id(cmd.transaction_id)?;
        self.ensure_pending("link maintenance")?;
        if self.maintenance_record == Some(cmd.record_id) {
            return Ok(vec![]);
        }

        Ok(vec![TransferEvent::MaintenanceLinked(MaintenanceLinked {
            transaction_id: cmd.transaction_id,
            record_id: cmd.record_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_accept(&self, cmd: &AcceptTransaction) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_transaction_id(cmd.transaction_id)?;
        self.ensure_not_concluded()?;

        let report = ReceiptReport {
            received: cmd.received.clone(),
            not_received: cmd.not_received.clone(),
        };
        let reconciliation = reconcile(self, &report)?;

        // A linked maintenance record decides the purpose regardless of what the receiver said.
        let purpose = if self.maintenance_record.is_some() {
            Purpose::Maintenance
        } else {
            cmd.purpose.unwrap_or(Purpose::General)
        };

        let comment = Some(cmd.comment.trim().to_string()).filter(|c| !c.is_empty());
        let rejection_reason = match reconciliation.status {
            TransactionStatus::Accepted => None,
            _ => Some(
                comment
                    .clone()
                    .unwrap_or_else(|| reconciliation.rejection_summary()),
            ),
        };

        Ok(vec![TransferEvent::TransactionReconciled(TransactionReconciled {
            transaction_id: cmd.transaction_id,
            status: reconciliation.status,
            outcomes: reconciliation.outcomes,
            purpose,
            acceptance_comment: comment,
            rejection_reason,
            approved_by: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectTransaction) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_transaction_id(cmd.transaction_id)?;
        self.ensure_not_concluded()?;
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("rejection reason cannot be empty"));
        }

        Ok(vec![TransferEvent::TransactionRejected(TransactionRejected {
            transaction_id: cmd.transaction_id,
            reason: cmd.reason.trim().to_string(),
            rejected_by: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_resolve_line(&self, cmd: &ResolveLine) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_transaction_id(cmd.transaction_id)?;

        match self.status {
            TransactionStatus::Accepted
            | TransactionStatus::Rejected
            | TransactionStatus::Resolving => {}
            TransactionStatus::Pending => {
                return Err(DomainError::invalid_state(
                    format!("transaction {}", self.id),
                    "ACCEPTED, REJECTED or RESOLVING",
                    self.status.as_str(),
                ));
            }
            TransactionStatus::Resolved => {
                return Err(DomainError::conflict(format!(
                    "transaction {} is already resolved",
                    self.id
                )));
            }
        }

        let line = self.line(cmd.line_id).ok_or_else(|| {
            DomainError::not_found(format!(
                "line {} in transaction {}",
                cmd.line_id, self.id
            ))
        })?;
        if line.status == LineStatus::Resolved {
            return Err(DomainError::conflict(format!(
                "line {} is already resolved",
                line.id
            )));
        }

        // Only RESOLVED lines count; an ACCEPTED sibling keeps the transaction RESOLVING.
        let resolved = self
            .lines
            .iter()
            .filter(|l| l.id == cmd.line_id || l.status == LineStatus::Resolved)
            .count();
        let transaction_status = if resolved == self.lines.len() {
            TransactionStatus::Resolved
        } else {
            TransactionStatus::Resolving
        };

        Ok(vec![TransferEvent::LineResolved(LineResolved {
            transaction_id: self.id,
            line_id: cmd.line_id,
            transaction_status,
            occurred_at: cmd.occurred_at,
        })])
    }
}
