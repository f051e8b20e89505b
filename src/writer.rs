use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ByteOrder};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::config::MmvWriterConfig;
use crate::error::{MmvError, MmvResult};
use crate::instance::{Instance, InstanceDomain};
use crate::layout::{self, HEADER_LEN, RegionLayout, TOC_ENTRY_LEN};
use crate::metric::{MetricDescriptor, MetricName, MetricNameValidator};
use crate::region::MappedRegion;
use crate::store::EntityStore;
use crate::strings::{STRING_CELL_LEN, STRING_TEXT_LIMIT, StringTable};
use crate::units::Unit;
use crate::value::{AtomBits, MetricValue, Semantics, ValueSlot};
use crate::version::MmvVersion;

const HEADER_TAG: &[u8; 4] = b"MMV\0";
/// Header offsets of the two generation markers.
pub const GENERATION1_OFFSET: usize = 8;
pub const GENERATION2_OFFSET: usize = 16;

/// Build-phase entity state, serialized by the surrounding collaborator.
struct WriterCore {
    strings: StringTable,
    domains: EntityStore<InstanceDomain>,
    metrics: EntityStore<MetricDescriptor>,
    values: Vec<ValueSlot>,
    /// Canonical value key (`"metric[instance]"`) to slot index.
    value_index: HashMap<String, usize>,
}

/// Where an update for one value key lands in the mapped region.
#[derive(Debug, Clone)]
enum SlotTarget {
    Numeric {
        offset: usize,
        type_code: crate::value::MetricType,
    },
    Text {
        cell_offset: usize,
    },
}

struct ActiveRegion {
    region: Arc<MappedRegion>,
    bindings: HashMap<String, SlotTarget>,
}

/// Top-level writer for one shared MMV region.
///
/// Lifecycle: register metrics and help text while not started, `start()`
/// once to lay out and publish the region, then update values freely from
/// any number of threads. `reset()` discards everything and returns the
/// writer to the build phase.
///
/// Structural calls (`add_metric`, help setters, `start`, `reset`) must not
/// run concurrently with each other; `update_metric` may run concurrently
/// with itself from many threads once started.
pub struct MmvWriter {
    config: MmvWriterConfig,
    validator: MetricNameValidator,
    core: Mutex<WriterCore>,
    active: RwLock<Option<ActiveRegion>>,
    started: AtomicBool,
}

impl MmvWriter {
    pub fn new(config: MmvWriterConfig) -> Self {
        let validator = config.version.name_validator();
        let core = WriterCore {
            strings: StringTable::new(config.string_block_capacity),
            domains: EntityStore::new(),
            metrics: EntityStore::new(),
            values: Vec::new(),
            value_index: HashMap::new(),
        };
        Self {
            config,
            validator,
            core: Mutex::new(core),
            active: RwLock::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &MmvWriterConfig {
        &self.config
    }

    pub fn version(&self) -> MmvVersion {
        self.config.version
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Register one exported value and its initial contents.
    ///
    /// Valid only before `start()`. The metric descriptor and, for
    /// instance-keyed names, the owning domain and instance are created on
    /// first sight; re-registering an existing name must agree with the
    /// stored description.
    pub fn add_metric(
        &self,
        name: &MetricName,
        semantics: Semantics,
        unit: Unit,
        initial: MetricValue,
    ) -> MmvResult<()> {
        self.validator.validate(name)?;
        let mut core = self.core.lock();
        if self.started.load(Ordering::Acquire) {
            return Err(MmvError::invalid_state(
                "metrics cannot be added after start()",
            ));
        }
        let core = &mut *core;
        let key = name.to_string();
        if core.value_index.contains_key(&key) {
            return Err(MmvError::validation(format!(
                "metric {key:?} is already registered"
            )));
        }

        let version = self.config.version;
        let type_code = initial.type_code();
        let strings = &mut core.strings;
        let metric_index = core.metrics.get_or_create(name.metric(), |metric_name, id| {
            let name_string = if version.interns_names() {
                Some(strings.intern(metric_name)?)
            } else {
                None
            };
            Ok(MetricDescriptor::new(
                metric_name,
                id,
                name_string,
                type_code,
                semantics,
                unit,
            ))
        })?;
        core.metrics
            .get(metric_index)
            .check_compatible(type_code, semantics, unit)?;

        let instance = match name.instance() {
            Some(instance_name) => {
                if core.value_index.contains_key(name.metric()) {
                    return Err(MmvError::validation(format!(
                        "metric {:?} is already registered without an instance",
                        name.metric()
                    )));
                }
                let domain_index = core
                    .domains
                    .get_or_create(name.metric(), |domain_name, id| {
                        Ok(InstanceDomain::new(domain_name, id))
                    })?;
                core.metrics.get_mut(metric_index).domain = Some(domain_index);
                let strings = &mut core.strings;
                let domain = core.domains.get_mut(domain_index);
                let instance_index =
                    domain
                        .instances
                        .get_or_create(instance_name, |instance_name, id| {
                            let name_string = if version.interns_names() {
                                Some(strings.intern(instance_name)?)
                            } else {
                                None
                            };
                            Ok(Instance::new(instance_name, id, name_string))
                        })?;
                Some((domain_index, instance_index))
            }
            None => {
                if core.metrics.get(metric_index).domain.is_some() {
                    return Err(MmvError::validation(format!(
                        "metric {:?} is already registered with instances",
                        name.metric()
                    )));
                }
                None
            }
        };

        let string = match &initial {
            MetricValue::String(text) => Some(core.strings.reserve(text)?),
            _ => None,
        };
        core.value_index.insert(key, core.values.len());
        core.values.push(ValueSlot {
            offset: 0,
            metric_index,
            instance,
            value: initial,
            string,
        });
        Ok(())
    }

    /// Attach help text to an already registered metric.
    pub fn set_metric_help(
        &self,
        metric: &str,
        short_help: Option<&str>,
        long_help: Option<&str>,
    ) -> MmvResult<()> {
        let mut core = self.core.lock();
        if self.started.load(Ordering::Acquire) {
            return Err(MmvError::invalid_state(
                "help text cannot be set after start()",
            ));
        }
        let core = &mut *core;
        let index = core.metrics.index_of(metric).ok_or_else(|| {
            MmvError::validation(format!("unknown metric {metric:?} for help text"))
        })?;
        let short_help = intern_help(&mut core.strings, short_help)?;
        let long_help = intern_help(&mut core.strings, long_help)?;
        core.metrics.get_mut(index).set_help(short_help, long_help);
        Ok(())
    }

    /// Attach help text to an instance domain, creating the domain if it has
    /// not been seen yet. A domain created this way still needs at least one
    /// instance registered before `start()` will accept the layout.
    pub fn set_instance_domain_help(
        &self,
        domain: &str,
        short_help: Option<&str>,
        long_help: Option<&str>,
    ) -> MmvResult<()> {
        let mut core = self.core.lock();
        if self.started.load(Ordering::Acquire) {
            return Err(MmvError::invalid_state(
                "help text cannot be set after start()",
            ));
        }
        let core = &mut *core;
        let index = core.domains.get_or_create(domain, |domain_name, id| {
            Ok(InstanceDomain::new(domain_name, id))
        })?;
        let short_help = intern_help(&mut core.strings, short_help)?;
        let long_help = intern_help(&mut core.strings, long_help)?;
        core.domains.get_mut(index).set_help(short_help, long_help);
        Ok(())
    }

    /// Lay out and publish the region.
    ///
    /// The generation markers disagree for the whole writing phase and are
    /// reconciled as the final store, so a reader never mistakes a partial
    /// region for a consistent snapshot. On failure the writer stays in the
    /// build phase and the call may be retried after fixing the cause.
    pub fn start(&self) -> MmvResult<()> {
        let mut core = self.core.lock();
        if self.started.load(Ordering::Acquire) {
            return Err(MmvError::invalid_state("writer already started"));
        }
        let core = &mut *core;
        let layout = layout::plan(
            self.config.version,
            &mut core.domains,
            &mut core.metrics,
            &mut core.values,
            &mut core.strings,
        )?;
        let region = MappedRegion::create(&self.config.path, layout.total_len)?;
        let generation = current_generation();
        self.write_region(core, &layout, &region, generation)?;
        region.flush()?;
        region.store_u64(GENERATION2_OFFSET, generation)?;
        region.flush_range(0, HEADER_LEN)?;

        let bindings = build_bindings(core);
        *self.active.write() = Some(ActiveRegion {
            region: Arc::new(region),
            bindings,
        });
        self.started.store(true, Ordering::Release);
        debug!(
            path = %self.config.path.display(),
            bytes = layout.total_len,
            metrics = core.metrics.len(),
            values = core.values.len(),
            "mmv region published"
        );
        Ok(())
    }

    /// Write the new value into its slot.
    ///
    /// Valid only once started; touches nothing but the slot itself. Numeric
    /// updates are single aligned stores and safe to issue concurrently from
    /// any number of threads against distinct slots.
    pub fn update_metric(&self, name: &MetricName, value: MetricValue) -> MmvResult<()> {
        if !self.started.load(Ordering::Acquire) {
            return Err(MmvError::invalid_state(
                "update_metric called before start()",
            ));
        }
        let active = self.active.read();
        let active = active
            .as_ref()
            .ok_or_else(|| MmvError::invalid_state("no active region"))?;
        let key = name.to_string();
        let target = active
            .bindings
            .get(&key)
            .ok_or_else(|| MmvError::validation(format!("unknown metric {key:?}")))?;
        match target {
            SlotTarget::Numeric { offset, type_code } => {
                if value.type_code() != *type_code {
                    return Err(MmvError::validation(format!(
                        "update type {:?} does not match {:?} for {key:?}",
                        value.type_code(),
                        type_code
                    )));
                }
                match value.atom_bits() {
                    Some(AtomBits::W32(bits)) => active.region.store_u32(*offset, bits),
                    Some(AtomBits::W64(bits)) => active.region.store_u64(*offset, bits),
                    None => Err(MmvError::validation(format!(
                        "string update for numeric metric {key:?}"
                    ))),
                }
            }
            SlotTarget::Text { cell_offset } => {
                let MetricValue::String(text) = &value else {
                    return Err(MmvError::validation(format!(
                        "numeric update for string metric {key:?}"
                    )));
                };
                if text.len() > STRING_TEXT_LIMIT {
                    return Err(MmvError::capacity(format!(
                        "string update of {} bytes exceeds the cell limit",
                        text.len()
                    )));
                }
                // The cell rewrite is not a single store; a racing reader can
                // observe mixed text, never out-of-bounds bytes.
                let mut cell = [0u8; STRING_CELL_LEN];
                cell[..text.len()].copy_from_slice(text.as_bytes());
                active.region.write_bytes(*cell_offset, &cell)
            }
        }
    }

    /// Discard all entities and the mapped region, returning to the build
    /// phase. The backing file is left behind and rewritten by the next
    /// `start()`.
    pub fn reset(&self) {
        let mut core = self.core.lock();
        *self.active.write() = None;
        self.started.store(false, Ordering::Release);
        core.strings = StringTable::new(self.config.string_block_capacity);
        core.domains.clear();
        core.metrics.clear();
        core.values.clear();
        core.value_index.clear();
        debug!(path = %self.config.path.display(), "mmv writer reset");
    }

    fn write_region(
        &self,
        core: &WriterCore,
        layout: &RegionLayout,
        region: &MappedRegion,
        generation: u64,
    ) -> MmvResult<()> {
        let mut header = [0u8; HEADER_LEN];
        header[0..4].copy_from_slice(HEADER_TAG);
        BigEndian::write_u32(&mut header[4..8], self.config.version.code());
        BigEndian::write_u64(&mut header[8..16], generation);
        // generation2 (bytes 16..24) stays zero until every section is down
        BigEndian::write_i32(&mut header[24..28], layout.toc.len() as i32);
        BigEndian::write_u32(&mut header[28..32], self.config.flags);
        BigEndian::write_u32(&mut header[32..36], self.config.process_id);
        BigEndian::write_u32(&mut header[36..40], self.config.cluster_id);
        region.write_bytes(0, &header)?;

        let mut toc_offset = HEADER_LEN;
        for entry in &layout.toc {
            region.write_bytes(toc_offset, &entry.encode())?;
            toc_offset += TOC_ENTRY_LEN;
        }

        for domain in core.domains.iter() {
            region.write_bytes(domain.offset() as usize, &domain.encode(&core.strings)?)?;
            for instance in domain.instances.iter() {
                match self.config.version {
                    MmvVersion::V1 => region.write_bytes(
                        instance.offset() as usize,
                        &instance.encode_v1(domain.offset()),
                    )?,
                    MmvVersion::V2 => region.write_bytes(
                        instance.offset() as usize,
                        &instance.encode_v2(&core.strings, domain.offset())?,
                    )?,
                }
            }
        }

        for metric in core.metrics.iter() {
            let domain_id = metric.domain.map(|index| core.domains.get(index).id());
            match self.config.version {
                MmvVersion::V1 => region.write_bytes(
                    metric.offset() as usize,
                    &metric.encode_v1(&core.strings, domain_id),
                )?,
                MmvVersion::V2 => region.write_bytes(
                    metric.offset() as usize,
                    &metric.encode_v2(&core.strings, domain_id)?,
                )?,
            }
        }

        for slot in &core.values {
            let metric_offset = core.metrics.get(slot.metric_index).offset();
            let instance_offset = slot
                .instance
                .map(|(domain, instance)| {
                    core.domains.get(domain).instances.get(instance).offset()
                })
                .unwrap_or(0);
            region.write_bytes(
                slot.offset as usize,
                &slot.encode(&core.strings, metric_offset, instance_offset),
            )?;
        }

        for handle in core.strings.handles() {
            region.write_bytes(
                core.strings.offset(handle) as usize,
                &core.strings.encode_cell(handle),
            )?;
        }
        Ok(())
    }
}

fn intern_help(
    strings: &mut StringTable,
    text: Option<&str>,
) -> MmvResult<Option<crate::strings::StringHandle>> {
    match text {
        Some(text) => Ok(Some(strings.intern(text)?)),
        None => Ok(None),
    }
}

fn build_bindings(core: &WriterCore) -> HashMap<String, SlotTarget> {
    core.value_index
        .iter()
        .map(|(key, &slot_index)| {
            let slot = &core.values[slot_index];
            let target = match slot.string {
                Some(handle) => SlotTarget::Text {
                    cell_offset: core.strings.offset(handle) as usize,
                },
                None => SlotTarget::Numeric {
                    offset: slot.offset as usize,
                    type_code: slot.value.type_code(),
                },
            };
            (key.clone(), target)
        })
        .collect()
}

fn current_generation() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
        .max(1)
}
