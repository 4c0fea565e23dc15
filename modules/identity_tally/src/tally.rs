//! Identity tally: concurrent per-identity signature counts

use dashmap::{mapref::entry::Entry, DashMap};
use provenance_common::{Identity, IdentityObservationSink, Role};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// What is known about one signing identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRecord {
    pub role: Role,
    pub common_name: String,
    pub serial_number: String,

    /// SHA-256 of the DER certificate, hex
    pub fingerprint: String,

    /// Blocks signed (orderers) or endorsements given (peers)
    pub count: u64,

    /// Lowest block signed, orderers only
    pub first_block: Option<u64>,

    /// Most recently recorded block, not necessarily the highest.
    /// Redelivery is checked against it.
    pub last_block: Option<u64>,
}

impl IdentityRecord {
    fn new(identity: Identity, block_number: Option<u64>) -> Self {
        Self {
            role: identity.role,
            fingerprint: fingerprint(&identity.certificate),
            common_name: identity.common_name,
            serial_number: identity.serial_number,
            count: 1,
            first_block: block_number,
            last_block: block_number,
        }
    }
}

/// Counts keyed by role and certificate serial number.
/// Safe for concurrent use from several block handlers.
#[derive(Debug, Default)]
pub struct IdentityTally {
    records: DashMap<(Role, String), IdentityRecord>,
}

impl IdentityTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one observation, returning whether it was counted. An orderer
    /// observation for the block already last recorded against that
    /// identity is a redelivery and is ignored.
    pub fn record(&self, identity: Identity, block_number: Option<u64>) -> bool {
        let key = (identity.role, identity.serial_number.clone());
        match self.records.entry(key) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                if block_number.is_some() && block_number == record.last_block {
                    return false;
                }

                record.count += 1;
                if let Some(number) = block_number {
                    record.first_block = Some(record.first_block.map_or(number, |f| f.min(number)));
                    record.last_block = Some(number);
                }

                // Certificates get reissued under the same serial
                if record.common_name != identity.common_name {
                    record.common_name = identity.common_name;
                }
                record.fingerprint = fingerprint(&identity.certificate);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(IdentityRecord::new(identity, block_number));
                true
            }
        }
    }

    pub fn get(&self, role: Role, serial_number: &str) -> Option<IdentityRecord> {
        // Clone out, refs hold a shard lock
        self.records.get(&(role, serial_number.to_string())).map(|r| r.value().clone())
    }

    /// Identities of one role, most active first, ties by common name
    pub fn ranking(&self, role: Role) -> Vec<IdentityRecord> {
        let mut records: Vec<IdentityRecord> = self
            .records
            .iter()
            .filter(|entry| entry.key().0 == role)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.common_name.cmp(&b.common_name))
                .then_with(|| a.serial_number.cmp(&b.serial_number))
        });
        records
    }

    /// Orderer ranking followed by peer ranking
    pub fn all(&self) -> Vec<IdentityRecord> {
        let mut records = self.ranking(Role::Orderer);
        records.extend(self.ranking(Role::Peer));
        records
    }

    /// Number of distinct identities of a role
    pub fn identities(&self, role: Role) -> usize {
        self.records.iter().filter(|entry| entry.key().0 == role).count()
    }

    /// Sum of counts of a role
    pub fn total(&self, role: Role) -> u64 {
        self.records
            .iter()
            .filter(|entry| entry.key().0 == role)
            .map(|entry| entry.value().count)
            .sum()
    }
}

impl IdentityObservationSink for IdentityTally {
    fn build_up(&self, identity: Identity, block_number: Option<u64>) {
        self.record(identity, block_number);
    }
}

fn fingerprint(certificate: &[u8]) -> String {
    hex::encode(Sha256::digest(certificate))
}
