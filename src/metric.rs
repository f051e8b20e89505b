use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{MmvError, MmvResult};
use crate::strings::{STRING_TEXT_LIMIT, StringHandle, StringTable};
use crate::units::Unit;
use crate::value::{MetricType, Semantics};

/// On-disk length of a v2 metric descriptor.
pub const METRIC_LEN_V2: usize = 48;
/// On-disk length of a v1 metric descriptor (inline name).
pub const METRIC_LEN_V1: usize = 104;
/// Longest metric name the v1 inline field can hold.
pub const METRIC_NAME_LIMIT_V1: usize = 63;

const INLINE_NAME_LEN: usize = 64;

/// Reserved instance-domain id written for metrics without a domain. The
/// allocator only produces non-negative ids, so this can never collide.
pub const NO_INSTANCE_DOMAIN_ID: i32 = -1;

/// Key addressing one exported value: a metric name plus an optional
/// instance, written `"disk.reads[sda]"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricName {
    metric: String,
    instance: Option<String>,
}

impl MetricName {
    pub fn new(metric: &str, instance: Option<&str>) -> Self {
        Self {
            metric: metric.to_string(),
            instance: instance.map(str::to_string),
        }
    }

    /// Parse the bracketed key form. The bracket may appear mid-name
    /// (`"sheep[baa].bagsfull"` names metric `sheep.bagsfull`).
    pub fn parse(raw: &str) -> MmvResult<Self> {
        let Some(open) = raw.find('[') else {
            if raw.contains(']') {
                return Err(MmvError::validation(format!("unmatched ']' in {raw:?}")));
            }
            return Ok(Self::new(raw, None));
        };
        let close = raw[open..]
            .find(']')
            .map(|index| open + index)
            .ok_or_else(|| MmvError::validation(format!("unmatched '[' in {raw:?}")))?;
        let instance = &raw[open + 1..close];
        if instance.is_empty() {
            return Err(MmvError::validation(format!("empty instance in {raw:?}")));
        }
        let rest = &raw[close + 1..];
        if rest.contains('[') || rest.contains(']') {
            return Err(MmvError::validation(format!(
                "more than one instance in {raw:?}"
            )));
        }
        let metric = format!("{}{}", &raw[..open], rest);
        Ok(Self::new(&metric, Some(instance)))
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }
}

impl Display for MetricName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "{}[{}]", self.metric, instance),
            None => write!(f, "{}", self.metric),
        }
    }
}

impl FromStr for MetricName {
    type Err = MmvError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

/// Enforces the active format version's name limits before any entity is
/// created.
#[derive(Debug, Clone, Copy)]
pub struct MetricNameValidator {
    name_limit: usize,
    instance_limit: usize,
}

impl MetricNameValidator {
    pub fn new(name_limit: usize, instance_limit: usize) -> Self {
        Self {
            name_limit,
            instance_limit,
        }
    }

    pub fn for_v1() -> Self {
        Self::new(METRIC_NAME_LIMIT_V1, crate::instance::INSTANCE_NAME_LIMIT_V1)
    }

    pub fn for_v2() -> Self {
        Self::new(STRING_TEXT_LIMIT, STRING_TEXT_LIMIT)
    }

    pub fn validate(&self, name: &MetricName) -> MmvResult<()> {
        let metric = name.metric();
        if metric.is_empty() {
            return Err(MmvError::validation("metric name is empty"));
        }
        if metric.len() > self.name_limit {
            return Err(MmvError::validation(format!(
                "metric name {metric:?} exceeds the {} byte limit",
                self.name_limit
            )));
        }
        let mut chars = metric.chars();
        let first = chars.next().unwrap_or('\0');
        if !first.is_ascii_alphabetic() {
            return Err(MmvError::validation(format!(
                "metric name {metric:?} must start with an ASCII letter"
            )));
        }
        if let Some(bad) = chars.find(|ch| !ch.is_ascii_alphanumeric() && *ch != '.' && *ch != '_')
        {
            return Err(MmvError::validation(format!(
                "metric name {metric:?} contains disallowed character {bad:?}"
            )));
        }
        if let Some(instance) = name.instance() {
            if instance.len() > self.instance_limit {
                return Err(MmvError::validation(format!(
                    "instance name {instance:?} exceeds the {} byte limit",
                    self.instance_limit
                )));
            }
        }
        Ok(())
    }
}

/// Static description of one exported metric.
#[derive(Debug)]
pub struct MetricDescriptor {
    name: String,
    id: u32,
    pub(crate) offset: u64,
    /// Interned name cell; present under the v2 format only.
    name_string: Option<StringHandle>,
    type_code: MetricType,
    semantics: Semantics,
    unit: Unit,
    /// Index of the linked domain within the writer's domain store.
    pub(crate) domain: Option<usize>,
    short_help: Option<StringHandle>,
    long_help: Option<StringHandle>,
}

impl MetricDescriptor {
    pub fn new(
        name: &str,
        id: u32,
        name_string: Option<StringHandle>,
        type_code: MetricType,
        semantics: Semantics,
        unit: Unit,
    ) -> Self {
        Self {
            name: name.to_string(),
            id,
            offset: 0,
            name_string,
            type_code,
            semantics,
            unit,
            domain: None,
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

    pub fn type_code(&self) -> MetricType {
        self.type_code
    }

    pub fn semantics(&self) -> Semantics {
        self.semantics
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn set_help(&mut self, short_help: Option<StringHandle>, long_help: Option<StringHandle>) {
        self.short_help = short_help;
        self.long_help = long_help;
    }

    /// Check that a repeat registration agrees with the stored description.
    pub fn check_compatible(
        &self,
        type_code: MetricType,
        semantics: Semantics,
        unit: Unit,
    ) -> MmvResult<()> {
        if self.type_code != type_code || self.semantics != semantics || self.unit != unit {
            return Err(MmvError::validation(format!(
                "metric {:?} re-registered with a conflicting description",
                self.name
            )));
        }
        Ok(())
    }

    /// v2 record: name string offset, id, type, semantics, dimensions,
    /// domain id (or the reserved sentinel), padding, help offsets.
    pub fn encode_v2(
        &self,
        strings: &StringTable,
        domain_id: Option<u32>,
    ) -> MmvResult<[u8; METRIC_LEN_V2]> {
        let name_string = self.name_string.ok_or_else(|| {
            MmvError::invalid_state(format!("metric {:?} has no interned name", self.name))
        })?;
        let mut record = [0u8; METRIC_LEN_V2];
        BigEndian::write_u64(&mut record[0..8], strings.offset(name_string));
        self.encode_tail(strings, domain_id, &mut record[8..]);
        Ok(record)
    }

    /// v1 record: inline null-padded name, then the same tail as v2.
    pub fn encode_v1(
        &self,
        strings: &StringTable,
        domain_id: Option<u32>,
    ) -> [u8; METRIC_LEN_V1] {
        let mut record = [0u8; METRIC_LEN_V1];
        let name = self.name.as_bytes();
        let len = name.len().min(INLINE_NAME_LEN - 1);
        record[..len].copy_from_slice(&name[..len]);
        self.encode_tail(strings, domain_id, &mut record[INLINE_NAME_LEN..]);
        record
    }

    fn encode_tail(&self, strings: &StringTable, domain_id: Option<u32>, tail: &mut [u8]) {
        BigEndian::write_u32(&mut tail[0..4], self.id);
        BigEndian::write_i32(&mut tail[4..8], self.type_code as i32);
        BigEndian::write_i32(&mut tail[8..12], self.semantics.code());
        BigEndian::write_u32(&mut tail[12..16], self.unit.dimensions());
        let domain = domain_id
            .map(|id| id as i32)
            .unwrap_or(NO_INSTANCE_DOMAIN_ID);
        BigEndian::write_i32(&mut tail[16..20], domain);
        // bytes 20..24 stay zero: record padding
        BigEndian::write_u64(&mut tail[24..32], string_offset(strings, self.short_help));
        BigEndian::write_u64(&mut tail[32..40], string_offset(strings, self.long_help));
    }
}

fn string_offset(strings: &StringTable, handle: Option<StringHandle>) -> u64 {
    handle.map(|handle| strings.offset(handle)).unwrap_or(0)
}
