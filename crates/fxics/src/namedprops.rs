//! The named-property registry.
//!
//! Named properties are `(kind, guid, key)` triples mapped to stable
//! 16-bit ids in `[0x8000, 0xFFFF]`. The mapping is permanent once
//! assigned, and assignment must be race-free: the two mutating steps
//! (pick the next unused id, insert the record) run inside a backend
//! transaction.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use fxics_props::{NamedPropKey, NamedPropName, NamedPropResolver, PropertyType};

use crate::{Error, Result};

/// The first mapped id handed out by an empty registry.
pub const FIRST_MAPPED_ID: u16 = 0x8000;

/// Persistent storage for the registry: the six lookup/assignment
/// operations plus transaction demarcation.
pub trait NamedPropsBackend: Send + Sync {
    fn get_mapped_id(&self, name: &NamedPropName) -> Result<Option<u16>>;
    fn get_name(&self, mapped_id: u16) -> Result<Option<NamedPropName>>;
    fn get_name_type(&self, mapped_id: u16) -> Result<Option<PropertyType>>;
    /// The next free id: one past the highest assigned, or
    /// [`FIRST_MAPPED_ID`] on an empty table.
    fn next_unused_id(&self) -> Result<u16>;
    /// Inserts a record. Idempotent for an identical tuple; any other
    /// collision on `mapped_id` or on the name is a conflict.
    fn create_id(
        &self,
        name: &NamedPropName,
        mapped_id: u16,
        prop_type: PropertyType,
    ) -> Result<()>;
    fn transaction_start(&self) -> Result<()>;
    fn transaction_commit(&self) -> Result<()>;
}

/// One record of the bootstrap descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedEntry {
    pub name: NamedPropName,
    pub mapped_id: u16,
    pub prop_type: PropertyType,
}

/// The engine-side registry wrapper: lookup both directions plus
/// race-free create-on-miss.
pub struct NamedPropsRegistry {
    backend: Box<dyn NamedPropsBackend>,
}

impl NamedPropsRegistry {
    pub fn new(backend: Box<dyn NamedPropsBackend>) -> Self {
        NamedPropsRegistry { backend }
    }

    /// Looks the name up, assigning a fresh mapped id when absent.
    /// Both mutating steps run inside one backend transaction so
    /// concurrent callers never claim the same id.
    pub fn get_or_create(&self, name: &NamedPropName) -> Result<u16> {
        if let Some(id) = self.backend.get_mapped_id(name)? {
            return Ok(id);
        }
        self.backend.transaction_start()?;
        let result = self.assign_locked(name);
        match result {
            Ok(id) => {
                self.backend.transaction_commit()?;
                Ok(id)
            }
            Err(err) => {
                // Commit releases the transaction; the failed
                // assignment wrote nothing.
                self.backend.transaction_commit()?;
                Err(err)
            }
        }
    }

    fn assign_locked(&self, name: &NamedPropName) -> Result<u16> {
        // Re-check under the transaction: another caller may have won
        // the race between our first lookup and the transaction start.
        if let Some(id) = self.backend.get_mapped_id(name)? {
            return Ok(id);
        }
        let id = self.backend.next_unused_id()?;
        self.backend
            .create_id(name, id, PropertyType::UNSPECIFIED)?;
        Ok(id)
    }

    pub fn get_mapped_id(&self, name: &NamedPropName) -> Result<Option<u16>> {
        self.backend.get_mapped_id(name)
    }

    pub fn get_name(&self, mapped_id: u16) -> Result<Option<NamedPropName>> {
        self.backend.get_name(mapped_id)
    }

    pub fn get_name_type(&self, mapped_id: u16) -> Result<Option<PropertyType>> {
        self.backend.get_name_type(mapped_id)
    }

    /// Loads well-known names from a seed descriptor into an empty or
    /// partially seeded backend. Existing identical records are left
    /// alone. Returns the number of records inserted.
    pub fn seed(&self, descriptor: &str) -> Result<usize> {
        let entries = parse_seed_descriptor(descriptor)?;
        let mut inserted = 0;
        self.backend.transaction_start()?;
        for entry in &entries {
            if self.backend.get_mapped_id(&entry.name)?.is_some() {
                continue;
            }
            self.backend
                .create_id(&entry.name, entry.mapped_id, entry.prop_type)?;
            inserted += 1;
        }
        self.backend.transaction_commit()?;
        log::debug!("seeded {inserted} named-property records");
        Ok(inserted)
    }
}

impl NamedPropResolver for NamedPropsRegistry {
    fn name_of(&self, mapped_id: u16) -> Option<NamedPropName> {
        self.backend.get_name(mapped_id).ok().flatten()
    }
}

/// Parses the line-oriented seed descriptor: `key: value` lines,
/// records separated by blank lines. Records whose `objectClass` is
/// not a named-property class are ignored, matching the tolerant
/// loader the descriptor format comes from.
pub fn parse_seed_descriptor(descriptor: &str) -> Result<Vec<SeedEntry>> {
    let mut entries = Vec::new();
    for block in descriptor.split("\n\n") {
        let mut fields: HashMap<&str, &str> = HashMap::new();
        for line in block.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                fields.insert(key.trim(), value.trim());
            }
        }
        let Some(&class) = fields.get("objectClass") else {
            continue;
        };
        let Some(&guid_text) = fields.get("oleguid") else {
            continue;
        };
        let guid = guid_text
            .parse()
            .map_err(|_| Error::InvalidParameter("seed oleguid"))?;
        let key = match class {
            "MNID_ID" => {
                let id = fields
                    .get("propId")
                    .and_then(|v| v.parse::<u32>().ok())
                    .ok_or(Error::InvalidParameter("seed propId"))?;
                NamedPropKey::Id(id)
            }
            "MNID_STRING" => {
                let name = fields
                    .get("propName")
                    .ok_or(Error::InvalidParameter("seed propName"))?;
                NamedPropKey::Name((*name).to_string())
            }
            _ => continue,
        };
        let mapped_id = fields
            .get("mappedId")
            .and_then(|v| v.parse::<u16>().ok())
            .ok_or(Error::InvalidParameter("seed mappedId"))?;
        let prop_type = fields
            .get("propType")
            .map(|v| parse_prop_type(v))
            .transpose()?
            .unwrap_or(PropertyType::UNSPECIFIED);
        entries.push(SeedEntry {
            name: NamedPropName { guid, key },
            mapped_id,
            prop_type,
        });
    }
    Ok(entries)
}

/// `propType` is either an integer or a `PT_*` token.
fn parse_prop_type(value: &str) -> Result<PropertyType> {
    if let Ok(number) = value.parse::<u16>() {
        return Ok(PropertyType(number));
    }
    let prop_type = match value {
        "PT_UNSPECIFIED" => PropertyType::UNSPECIFIED,
        "PT_NULL" => PropertyType::NULL,
        "PT_SHORT" | "PT_I2" => PropertyType::I2,
        "PT_LONG" => PropertyType::LONG,
        "PT_DOUBLE" => PropertyType::DOUBLE,
        "PT_ERROR" => PropertyType::ERROR,
        "PT_BOOLEAN" => PropertyType::BOOLEAN,
        "PT_OBJECT" => PropertyType::OBJECT,
        "PT_I8" | "PT_LONGLONG" => PropertyType::I8,
        "PT_STRING8" => PropertyType::STRING8,
        "PT_UNICODE" => PropertyType::UNICODE,
        "PT_SYSTIME" => PropertyType::SYSTIME,
        "PT_CLSID" => PropertyType::CLSID,
        "PT_SVREID" => PropertyType::SVREID,
        "PT_BINARY" => PropertyType::BINARY,
        _ => return Err(Error::InvalidParameter("seed propType")),
    };
    Ok(prop_type)
}

#[derive(Default)]
struct MemoryNamedPropsInner {
    by_id: HashMap<u16, (NamedPropName, PropertyType)>,
    by_name: HashMap<NamedPropName, u16>,
    highest: Option<u16>,
}

/// A lock that can be taken in one method call and released in a
/// later one, which a `MutexGuard` cannot express.
#[derive(Default)]
struct TxnLock {
    held: Mutex<bool>,
    released: Condvar,
}

impl TxnLock {
    fn acquire(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while *held {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *held = true;
    }

    fn release(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        *held = false;
        self.released.notify_one();
    }
}

/// In-memory registry backend. `transaction_start`/`commit` hold a
/// dedicated lock across calls, serializing the assignment path the
/// way a database transaction would.
#[derive(Default)]
pub struct MemoryNamedProps {
    inner: Mutex<MemoryNamedPropsInner>,
    txn: TxnLock,
}

impl MemoryNamedProps {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryNamedPropsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NamedPropsBackend for MemoryNamedProps {
    fn get_mapped_id(&self, name: &NamedPropName) -> Result<Option<u16>> {
        Ok(self.lock().by_name.get(name).copied())
    }

    fn get_name(&self, mapped_id: u16) -> Result<Option<NamedPropName>> {
        Ok(self.lock().by_id.get(&mapped_id).map(|(name, _)| name.clone()))
    }

    fn get_name_type(&self, mapped_id: u16) -> Result<Option<PropertyType>> {
        Ok(self.lock().by_id.get(&mapped_id).map(|(_, t)| *t))
    }

    fn next_unused_id(&self) -> Result<u16> {
        let inner = self.lock();
        Ok(match inner.highest {
            None => FIRST_MAPPED_ID,
            Some(u16::MAX) => return Err(Error::CallFailed("mapped id space exhausted".into())),
            Some(highest) => highest.max(FIRST_MAPPED_ID - 1) + 1,
        })
    }

    fn create_id(
        &self,
        name: &NamedPropName,
        mapped_id: u16,
        prop_type: PropertyType,
    ) -> Result<()> {
        let mut inner = self.lock();
        match (inner.by_id.get(&mapped_id), inner.by_name.get(name)) {
            (None, None) => {}
            (Some((existing, _)), Some(&id)) if existing == name && id == mapped_id => {
                return Ok(());
            }
            _ => return Err(Error::TransactionConflict),
        }
        inner.by_id.insert(mapped_id, (name.clone(), prop_type));
        inner.by_name.insert(name.clone(), mapped_id);
        inner.highest = Some(inner.highest.map_or(mapped_id, |h| h.max(mapped_id)));
        Ok(())
    }

    fn transaction_start(&self) -> Result<()> {
        self.txn.acquire();
        Ok(())
    }

    fn transaction_commit(&self) -> Result<()> {
        self.txn.release();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxics_dtyp::Guid;

    fn guid() -> Guid {
        "00062008-0000-0000-c000-000000000046".parse().unwrap()
    }

    fn registry() -> NamedPropsRegistry {
        NamedPropsRegistry::new(Box::new(MemoryNamedProps::new()))
    }

    #[test]
    fn first_assignment_starts_at_0x8000() {
        let registry = registry();
        let name = NamedPropName::by_name(guid(), "X-Custom");
        assert_eq!(registry.get_or_create(&name).unwrap(), 0x8000);
        assert_eq!(registry.get_or_create(&name).unwrap(), 0x8000);
        let other = NamedPropName::by_name(guid(), "X-Other");
        assert_eq!(registry.get_or_create(&other).unwrap(), 0x8001);
    }

    #[test]
    fn reverse_lookup_roundtrips() {
        let registry = registry();
        let name = NamedPropName::by_id(guid(), 0x8205);
        let id = registry.get_or_create(&name).unwrap();
        assert_eq!(registry.get_name(id).unwrap(), Some(name));
        assert_eq!(registry.get_name(0x9999).unwrap(), None);
    }

    #[test]
    fn seed_descriptor_parses_and_inserts() {
        let registry = registry();
        let descriptor = "\
objectClass: MNID_ID
oleguid: 00062008-0000-0000-c000-000000000046
propId: 34080
mappedId: 37153
propType: PT_LONG

# comment record
objectClass: MNID_STRING
oleguid: 00062008-0000-0000-c000-000000000046
propName: Keywords
mappedId: 37154
propType: PT_UNICODE

objectClass: somethingElse
oleguid: 00062008-0000-0000-c000-000000000046
";
        assert_eq!(registry.seed(descriptor).unwrap(), 2);
        assert_eq!(
            registry
                .get_mapped_id(&NamedPropName::by_id(guid(), 34080))
                .unwrap(),
            Some(37153)
        );
        assert_eq!(
            registry
                .get_name_type(37154)
                .unwrap(),
            Some(PropertyType::UNICODE)
        );
        // Re-seeding is a no-op.
        assert_eq!(registry.seed(descriptor).unwrap(), 0);
    }

    #[test]
    fn conflicting_create_is_rejected() {
        let backend = MemoryNamedProps::new();
        let name_a = NamedPropName::by_name(guid(), "A");
        let name_b = NamedPropName::by_name(guid(), "B");
        backend
            .create_id(&name_a, 0x8000, PropertyType::UNSPECIFIED)
            .unwrap();
        // Identical tuple: idempotent.
        backend
            .create_id(&name_a, 0x8000, PropertyType::UNSPECIFIED)
            .unwrap();
        // Same id, different name: conflict.
        assert!(matches!(
            backend.create_id(&name_b, 0x8000, PropertyType::UNSPECIFIED),
            Err(Error::TransactionConflict)
        ));
        // Same name, different id: conflict.
        assert!(matches!(
            backend.create_id(&name_a, 0x8001, PropertyType::UNSPECIFIED),
            Err(Error::TransactionConflict)
        ));
    }

    #[test]
    fn concurrent_get_or_create_assigns_one_id() {
        use std::sync::Arc;

        let registry = Arc::new(registry());
        let name = NamedPropName::by_name(guid(), "X-Race");
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            let name = name.clone();
            handles.push(std::thread::spawn(move || {
                registry.get_or_create(&name).unwrap()
            }));
        }
        let ids: Vec<u16> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.iter().all(|&id| id == ids[0]));
    }
}
