//! Zone replacement for providers that only expose per-record endpoints.
//!
//! The provider supplies a [`RecordBackend`]; [`replace_zone`] lists the
//! current records, diffs them against the desired set and applies the
//! difference one record at a time. Every record that fails is reported
//! individually so the caller can build a partial envelope.

use crate::envelope::{DnsChange, DnsUpdateResult, Envelope};
use crate::error::RegistrarError;
use crate::types::DnsRecordModel;

/// A record as it exists at the provider, with the vendor's own handle
/// (numeric id, hex id, ...) needed to address it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RemoteRecord {
    pub handle: String,
    pub record: DnsRecordModel,
}

impl RemoteRecord {
    /// For vendors whose ids are numeric: the id doubles as the handle.
    pub fn numeric(id: u64, mut record: DnsRecordModel) -> Self {
        record.id = Some(id);
        Self { handle: id.to_string(), record }
    }
}

#[async_trait::async_trait]
pub(crate) trait RecordBackend: Send + Sync {
    async fn list_records(&self, domain: &str) -> Result<Vec<RemoteRecord>, RegistrarError>;

    /// Returns the vendor id of the new record when it has a numeric one.
    async fn create_record(&self, domain: &str, record: &DnsRecordModel) -> Result<Option<u64>, RegistrarError>;

    async fn modify_record(
        &self,
        domain: &str,
        existing: &RemoteRecord,
        desired: &DnsRecordModel,
    ) -> Result<(), RegistrarError>;

    async fn remove_record(&self, domain: &str, existing: &RemoteRecord) -> Result<(), RegistrarError>;
}

/// Indices refer to the `current` slice the plan was built from.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct ZonePlan {
    pub create: Vec<DnsRecordModel>,
    pub update: Vec<(usize, DnsRecordModel)>,
    pub delete: Vec<usize>,
}

impl ZonePlan {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.create.len() + self.update.len() + self.delete.len()
    }
}

/// Diff `current` against `desired`.
///
/// Desired records that match an existing one exactly are left alone. A
/// desired record carrying the id of an existing record is an update. Any
/// other desired record is created, and existing records nobody claimed are
/// deleted.
pub(crate) fn plan(current: &[DnsRecordModel], desired: &[DnsRecordModel]) -> ZonePlan {
    let mut claimed = vec![false; current.len()];
    let mut zone_plan = ZonePlan::default();

    for record in desired {
        let exact = (0..current.len()).find(|&i| !claimed[i] && current[i].same_content(record));
        if let Some(i) = exact {
            claimed[i] = true;
            continue;
        }

        let by_id = record
            .id
            .and_then(|id| (0..current.len()).find(|&i| !claimed[i] && current[i].id == Some(id)));
        match by_id {
            Some(i) => {
                claimed[i] = true;
                zone_plan.update.push((i, record.clone()));
            }
            None => zone_plan.create.push(record.clone()),
        }
    }

    zone_plan.delete = (0..current.len()).filter(|&i| !claimed[i]).collect();
    zone_plan
}

/// Find the existing record a caller means: by id when given, otherwise by
/// name and type, narrowed by value when several share the slot.
pub(crate) fn locate<'a>(existing: &'a [RemoteRecord], record: &DnsRecordModel) -> Option<&'a RemoteRecord> {
    if let Some(id) = record.id {
        return existing.iter().find(|r| r.record.id == Some(id));
    }
    let slot: Vec<&RemoteRecord> = existing.iter().filter(|r| r.record.same_slot(record)).collect();
    match slot.as_slice() {
        [] => None,
        [only] => Some(*only),
        many => many.iter().copied().find(|r| r.record.value == record.value),
    }
}

pub(crate) fn not_found(domain: &str, record: &DnsRecordModel) -> RegistrarError {
    RegistrarError::vendor(
        Some("RECORD_NOT_FOUND".into()),
        format!("No DNS record matching {} on {}", record.describe(), domain),
    )
}

pub(crate) async fn locate_or_fail<B: RecordBackend + ?Sized>(
    backend: &B,
    domain: &str,
    record: &DnsRecordModel,
) -> Result<RemoteRecord, RegistrarError> {
    let existing = backend.list_records(domain).await?;
    locate(&existing, record).cloned().ok_or_else(|| not_found(domain, record))
}

/// Edit a full record list in place for providers that only accept the
/// whole zone back: replace the matching record, or remove it. Returns the
/// id of the record that was touched.
pub(crate) fn splice(
    records: &mut Vec<DnsRecordModel>,
    domain: &str,
    record: &DnsRecordModel,
    remove: bool,
) -> Result<Option<u64>, RegistrarError> {
    let position = match record.id {
        Some(id) => records.iter().position(|r| r.id == Some(id)),
        None => {
            let in_slot = records.iter().filter(|r| r.same_slot(record)).count();
            records
                .iter()
                .position(|r| r.same_slot(record) && (in_slot == 1 || r.value == record.value))
        }
    };
    let index = position.ok_or_else(|| not_found(domain, record))?;
    let id = records[index].id;
    if remove {
        records.remove(index);
    } else {
        records[index] = DnsRecordModel { id, ..record.clone() };
    }
    Ok(id)
}

pub(crate) async fn add_one<B: RecordBackend + ?Sized>(
    backend: &B,
    domain: &str,
    record: &DnsRecordModel,
) -> Result<DnsChange, RegistrarError> {
    crate::require_domain(domain)?;
    let record_id = backend.create_record(domain, record).await?;
    Ok(DnsChange { domain_name: domain.to_string(), applied: 1, record_id })
}

pub(crate) async fn update_one<B: RecordBackend + ?Sized>(
    backend: &B,
    domain: &str,
    record: &DnsRecordModel,
) -> Result<DnsChange, RegistrarError> {
    crate::require_domain(domain)?;
    let existing = locate_or_fail(backend, domain, record).await?;
    backend.modify_record(domain, &existing, record).await?;
    Ok(DnsChange { domain_name: domain.to_string(), applied: 1, record_id: existing.record.id })
}

pub(crate) async fn delete_one<B: RecordBackend + ?Sized>(
    backend: &B,
    domain: &str,
    record: &DnsRecordModel,
) -> Result<DnsChange, RegistrarError> {
    crate::require_domain(domain)?;
    let existing = locate_or_fail(backend, domain, record).await?;
    backend.remove_record(domain, &existing).await?;
    Ok(DnsChange { domain_name: domain.to_string(), applied: 1, record_id: existing.record.id })
}

pub(crate) async fn replace_zone<B: RecordBackend + ?Sized>(
    backend: &B,
    domain: &str,
    desired: &[DnsRecordModel],
) -> DnsUpdateResult {
    if let Err(err) = crate::require_domain(domain) {
        return Envelope::failure(err);
    }
    let current = match backend.list_records(domain).await {
        Ok(records) => records,
        Err(err) => return Envelope::failure(err),
    };
    let models: Vec<DnsRecordModel> = current.iter().map(|r| r.record.clone()).collect();
    let zone_plan = plan(&models, desired);
    if zone_plan.is_empty() {
        return Envelope::ok(
            "DNS zone already up to date",
            DnsChange { domain_name: domain.to_string(), applied: 0, record_id: None },
        );
    }

    let total = zone_plan.len();
    let mut applied = 0;
    let mut errors = Vec::new();

    // Writes before deletes so a failed create never leaves a name without records.
    for (index, record) in &zone_plan.update {
        match backend.modify_record(domain, &current[*index], record).await {
            Ok(()) => applied += 1,
            Err(err) => errors.push(format!("update {}: {}", record.describe(), err)),
        }
    }
    for record in &zone_plan.create {
        match backend.create_record(domain, record).await {
            Ok(_) => applied += 1,
            Err(err) => errors.push(format!("create {}: {}", record.describe(), err)),
        }
    }
    for index in &zone_plan.delete {
        let existing = &current[*index];
        match backend.remove_record(domain, existing).await {
            Ok(()) => applied += 1,
            Err(err) => errors.push(format!("delete {}: {}", existing.record.describe(), err)),
        }
    }

    if !errors.is_empty() {
        tracing::warn!(domain, failed = errors.len(), total, "zone replacement partially applied");
    }
    Envelope::partial(
        format!("{} of {} DNS changes applied", applied, total),
        DnsChange { domain_name: domain.to_string(), applied, record_id: None },
        errors,
    )
}
