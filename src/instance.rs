use byteorder::{BigEndian, ByteOrder};

use crate::error::{MmvError, MmvResult};
use crate::store::EntityStore;
use crate::strings::{StringHandle, StringTable};

/// On-disk length of an instance domain record.
pub const INSTANCE_DOMAIN_LEN: usize = 32;
/// On-disk length of a v2 instance record.
pub const INSTANCE_LEN_V2: usize = 24;
/// On-disk length of a v1 instance record (inline name).
pub const INSTANCE_LEN_V1: usize = 80;
/// Longest instance name the v1 inline field can hold.
pub const INSTANCE_NAME_LIMIT_V1: usize = 63;

const INLINE_NAME_LEN: usize = 64;

/// One member of an instance domain.
#[derive(Debug)]
pub struct Instance {
    name: String,
    id: u32,
    pub(crate) offset: u64,
    /// Interned name cell; present under the v2 format only.
    name_string: Option<StringHandle>,
}

impl Instance {
    pub fn new(name: &str, id: u32, name_string: Option<StringHandle>) -> Self {
        Self {
            name: name.to_string(),
            id,
            offset: 0,
            name_string,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// v2 record: owning domain offset, padded id, name string offset.
    pub fn encode_v2(
        &self,
        strings: &StringTable,
        domain_offset: u64,
    ) -> MmvResult<[u8; INSTANCE_LEN_V2]> {
        let name_string = self.name_string.ok_or_else(|| {
            MmvError::invalid_state(format!("instance {:?} has no interned name", self.name))
        })?;
        let mut record = [0u8; INSTANCE_LEN_V2];
        BigEndian::write_u64(&mut record[0..8], domain_offset);
        // bytes 8..12 stay zero: padding above the 4-byte external id
        BigEndian::write_u32(&mut record[12..16], self.id);
        BigEndian::write_u64(&mut record[16..24], strings.offset(name_string));
        Ok(record)
    }

    /// v1 record: owning domain offset, padded id, inline null-padded name.
    pub fn encode_v1(&self, domain_offset: u64) -> [u8; INSTANCE_LEN_V1] {
        let mut record = [0u8; INSTANCE_LEN_V1];
        BigEndian::write_u64(&mut record[0..8], domain_offset);
        BigEndian::write_u32(&mut record[12..16], self.id);
        let name = self.name.as_bytes();
        let len = name.len().min(INLINE_NAME_LEN - 1);
        record[16..16 + len].copy_from_slice(&name[..len]);
        record
    }
}

/// A named enumeration over which metrics may be indexed, owning its
/// instances. Serialized as a fixed record followed immediately by the
/// instance records in insertion order.
#[derive(Debug)]
pub struct InstanceDomain {
    name: String,
    id: u32,
    pub(crate) offset: u64,
    pub(crate) instances: EntityStore<Instance>,
    short_help: Option<StringHandle>,
    long_help: Option<StringHandle>,
}

impl InstanceDomain {
    pub fn new(name: &str, id: u32) -> Self {
        Self {
            name: name.to_string(),
            id,
            offset: 0,
            instances: EntityStore::new(),
            short_help: None,
            long_help: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn set_help(&mut self, short_help: Option<StringHandle>, long_help: Option<StringHandle>) {
        self.short_help = short_help;
        self.long_help = long_help;
    }

    /// Offset of the first owned instance; `None` while the domain is empty.
    pub fn first_instance_offset(&self) -> Option<u64> {
        self.instances.iter().next().map(Instance::offset)
    }

    /// Serialize the domain record. Empty domains have no well-defined first
    /// instance offset and are rejected before serialization is reached.
    pub fn encode(&self, strings: &StringTable) -> MmvResult<[u8; INSTANCE_DOMAIN_LEN]> {
        let first_instance = self.first_instance_offset().ok_or_else(|| {
            MmvError::validation(format!("instance domain {:?} has no instances", self.name))
        })?;
        let mut record = [0u8; INSTANCE_DOMAIN_LEN];
        BigEndian::write_u32(&mut record[0..4], self.id);
        BigEndian::write_u32(&mut record[4..8], self.instances.len() as u32);
        BigEndian::write_u64(&mut record[8..16], first_instance);
        BigEndian::write_u64(&mut record[16..24], string_offset(strings, self.short_help));
        BigEndian::write_u64(&mut record[24..32], string_offset(strings, self.long_help));
        Ok(record)
    }
}

fn string_offset(strings: &StringTable, handle: Option<StringHandle>) -> u64 {
    handle.map(|handle| strings.offset(handle)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_record_matches_the_on_disk_shape() {
        let mut strings = StringTable::new(4096);
        let name = strings.intern("myinst").expect("intern");
        strings.assign_offsets(30);
        let instance = Instance::new("myinst", 123, Some(name));

        let record = instance.encode_v2(&strings, 40).expect("encode");

        let expected: [u8; INSTANCE_LEN_V2] = [
            0, 0, 0, 0, 0, 0, 0, 40, // domain section offset
            0, 0, 0, 0, 0, 0, 0, 123, // padding, external instance id
            0, 0, 0, 0, 0, 0, 0, 30, // external instance name string offset
        ];
        assert_eq!(record, expected);
    }

    #[test]
    fn v1_record_inlines_the_name() {
        let instance = Instance::new("sda", 5, None);
        let record = instance.encode_v1(0x60);
        assert_eq!(record.len(), INSTANCE_LEN_V1);
        assert_eq!(&record[0..8], &[0, 0, 0, 0, 0, 0, 0, 0x60]);
        assert_eq!(&record[12..16], &[0, 0, 0, 5]);
        assert_eq!(&record[16..19], b"sda");
        assert!(record[19..].iter().all(|byte| *byte == 0));
    }

    #[test]
    fn domain_record_counts_instances_and_points_at_the_first() {
        let strings = StringTable::new(4096);
        let mut domain = InstanceDomain::new("disk", 9);
        for (index, name) in ["sda", "sdb"].iter().enumerate() {
            let slot = domain
                .instances
                .get_or_create(name, |n, id| Ok(Instance::new(n, id, None)))
                .expect("instance");
            domain.instances.get_mut(slot).offset = 0x100 + (index as u64) * 0x50;
        }

        let record = domain.encode(&strings).expect("encode");
        assert_eq!(record.len(), INSTANCE_DOMAIN_LEN);
        assert_eq!(&record[0..4], &[0, 0, 0, 9]);
        assert_eq!(&record[4..8], &[0, 0, 0, 2]);
        assert_eq!(&record[8..16], &[0, 0, 0, 0, 0, 0, 0x01, 0]);
        // no help text: both offsets zero
        assert!(record[16..].iter().all(|byte| *byte == 0));
    }

    #[test]
    fn empty_domain_cannot_be_serialized() {
        let strings = StringTable::new(4096);
        let domain = InstanceDomain::new("net", 2);
        let err = domain.encode(&strings).expect_err("empty domain");
        assert!(matches!(err, MmvError::Validation(_)));
    }
}
