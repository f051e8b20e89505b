use byteorder::{BigEndian, ByteOrder};

use crate::error::{MmvError, MmvResult};
use crate::instance::{INSTANCE_DOMAIN_LEN, InstanceDomain};
use crate::metric::MetricDescriptor;
use crate::store::EntityStore;
use crate::strings::StringTable;
use crate::value::ValueSlot;
use crate::version::MmvVersion;

/// On-disk length of the region header.
pub const HEADER_LEN: usize = 40;
/// On-disk length of one table-of-contents entry.
pub const TOC_ENTRY_LEN: usize = 16;

/// Section type codes carried by table-of-contents entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TocSection {
    InstanceDomains = 1,
    Instances = 2,
    Metrics = 3,
    Values = 4,
    Strings = 5,
}

/// One table-of-contents entry: section type, entry count, section offset.
#[derive(Debug, Clone, Copy)]
pub struct TocEntry {
    pub section: TocSection,
    pub entry_count: u32,
    pub offset: u64,
}

impl TocEntry {
    pub fn encode(&self) -> [u8; TOC_ENTRY_LEN] {
        let mut record = [0u8; TOC_ENTRY_LEN];
        BigEndian::write_u32(&mut record[0..4], self.section as u32);
        BigEndian::write_u32(&mut record[4..8], self.entry_count);
        BigEndian::write_u64(&mut record[8..16], self.offset);
        record
    }
}

/// Fully resolved placement of every section and entity in the region.
#[derive(Debug)]
pub struct RegionLayout {
    pub toc: Vec<TocEntry>,
    pub total_len: usize,
}

/// Resolve every entity's absolute offset in one deterministic pass.
///
/// Section order is fixed: header, table of contents, each instance domain
/// followed immediately by its instances, metrics, values, strings. Within a
/// section entities appear in store insertion order; every byte size is fixed
/// per version, so the pass never backtracks.
pub fn plan(
    version: MmvVersion,
    domains: &mut EntityStore<InstanceDomain>,
    metrics: &mut EntityStore<MetricDescriptor>,
    values: &mut [ValueSlot],
    strings: &mut StringTable,
) -> MmvResult<RegionLayout> {
    let mut toc_count = 2; // metrics and values are always present
    if !domains.is_empty() {
        toc_count += 2;
    }
    if !strings.is_empty() {
        toc_count += 1;
    }

    let mut cursor = (HEADER_LEN + toc_count * TOC_ENTRY_LEN) as u64;
    let mut toc = Vec::with_capacity(toc_count);

    if !domains.is_empty() {
        let domain_section = cursor;
        let mut instance_count = 0u32;
        let mut first_instance = 0u64;
        for domain in domains.iter_mut() {
            if domain.instance_count() == 0 {
                return Err(MmvError::validation(format!(
                    "instance domain {:?} has no instances",
                    domain.name()
                )));
            }
            domain.offset = cursor;
            cursor += INSTANCE_DOMAIN_LEN as u64;
            for instance in domain.instances.iter_mut() {
                if first_instance == 0 {
                    first_instance = cursor;
                }
                instance.offset = cursor;
                cursor += version.instance_record_len() as u64;
                instance_count += 1;
            }
        }
        toc.push(TocEntry {
            section: TocSection::InstanceDomains,
            entry_count: domains.len() as u32,
            offset: domain_section,
        });
        toc.push(TocEntry {
            section: TocSection::Instances,
            entry_count: instance_count,
            offset: first_instance,
        });
    }

    let metric_section = cursor;
    for metric in metrics.iter_mut() {
        metric.offset = cursor;
        cursor += version.metric_record_len() as u64;
    }
    toc.push(TocEntry {
        section: TocSection::Metrics,
        entry_count: metrics.len() as u32,
        offset: metric_section,
    });

    let value_section = cursor;
    for value in values.iter_mut() {
        value.offset = cursor;
        cursor += value.byte_size() as u64;
    }
    toc.push(TocEntry {
        section: TocSection::Values,
        entry_count: values.len() as u32,
        offset: value_section,
    });

    if !strings.is_empty() {
        strings.assign_offsets(cursor);
        toc.push(TocEntry {
            section: TocSection::Strings,
            entry_count: strings.len() as u32,
            offset: cursor,
        });
        cursor += strings.byte_size() as u64;
    }

    Ok(RegionLayout {
        toc,
        total_len: cursor as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Instance;
    use crate::units::Unit;
    use crate::value::{MetricValue, MetricType, Semantics};

    fn metric(name: &str, id: u32) -> MmvResult<MetricDescriptor> {
        Ok(MetricDescriptor::new(
            name,
            id,
            None,
            MetricType::U64,
            Semantics::FreeRunning,
            Unit::none(),
        ))
    }

    #[test]
    fn sections_are_contiguous_in_the_fixed_order() {
        let mut domains: EntityStore<InstanceDomain> = EntityStore::new();
        let mut metrics: EntityStore<MetricDescriptor> = EntityStore::new();
        let mut strings = StringTable::new(4096);

        let domain_index = domains
            .get_or_create("disk", |name, id| Ok(InstanceDomain::new(name, id)))
            .expect("domain");
        for name in ["sda", "sdb"] {
            domains
                .get_mut(domain_index)
                .instances
                .get_or_create(name, |n, id| Ok(Instance::new(n, id, None)))
                .expect("instance");
        }
        let metric_index = metrics.get_or_create("disk.reads", metric).expect("metric");
        strings.intern("help text").expect("intern");
        let mut values = vec![ValueSlot {
            offset: 0,
            metric_index,
            instance: Some((domain_index, 0)),
            value: MetricValue::U64(0),
            string: None,
        }];

        let layout = plan(
            MmvVersion::V2,
            &mut domains,
            &mut metrics,
            &mut values,
            &mut strings,
        )
        .expect("plan");

        // header + 5 toc entries, then the domain, then its two instances
        let domain_offset = (HEADER_LEN + 5 * TOC_ENTRY_LEN) as u64;
        let domain = domains.get(domain_index);
        assert_eq!(domain.offset(), domain_offset);
        assert_eq!(
            domain.first_instance_offset(),
            Some(domain_offset + INSTANCE_DOMAIN_LEN as u64)
        );

        let metric_offset = domain_offset + 32 + 2 * 24;
        assert_eq!(metrics.get(metric_index).offset(), metric_offset);
        assert_eq!(values[0].offset, metric_offset + 48);

        let string_offset = values[0].offset + 32;
        assert_eq!(layout.toc.len(), 5);
        assert_eq!(layout.toc[4].offset, string_offset);
        assert_eq!(layout.total_len as u64, string_offset + 256);
    }

    #[test]
    fn toc_counts_match_store_sizes() {
        let mut domains: EntityStore<InstanceDomain> = EntityStore::new();
        let mut metrics: EntityStore<MetricDescriptor> = EntityStore::new();
        let mut strings = StringTable::new(4096);
        metrics.get_or_create("a", metric).expect("metric");
        metrics.get_or_create("b", metric).expect("metric");
        let mut values: Vec<ValueSlot> = Vec::new();

        let layout = plan(
            MmvVersion::V2,
            &mut domains,
            &mut metrics,
            &mut values,
            &mut strings,
        )
        .expect("plan");

        assert_eq!(layout.toc.len(), 2);
        assert!(matches!(layout.toc[0].section, TocSection::Metrics));
        assert_eq!(layout.toc[0].entry_count, 2);
        assert!(matches!(layout.toc[1].section, TocSection::Values));
        assert_eq!(layout.toc[1].entry_count, 0);
    }

    #[test]
    fn zero_instance_domains_fail_the_pass() {
        let mut domains: EntityStore<InstanceDomain> = EntityStore::new();
        let mut metrics: EntityStore<MetricDescriptor> = EntityStore::new();
        let mut strings = StringTable::new(4096);
        domains
            .get_or_create("net", |name, id| Ok(InstanceDomain::new(name, id)))
            .expect("domain");

        let err = plan(
            MmvVersion::V2,
            &mut domains,
            &mut metrics,
            &mut [],
            &mut strings,
        )
        .expect_err("empty domain");
        assert!(matches!(err, MmvError::Validation(_)));
    }
}
