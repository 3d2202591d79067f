/// Sort field tags and field-list parsing for `--fields`.
///
/// FIELDS format: NAME[,NAME...], where NAME is a built-in field name or
/// its numeric alias. Fields are applied left to right; the first
/// non-equal comparison decides the order.
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Built-in record fields usable as sort keys.
///
/// The `*Msec` variants exist for CLI compatibility with tools that
/// display millisecond precision separately; they share the accessor of
/// their base field and sort identically. `FtypeClass` and `FtypeType`
/// both order by the flow type id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinField {
    Sip,
    Dip,
    Nhip,
    Sport,
    Dport,
    Proto,
    Pkts,
    Bytes,
    Flags,
    InitFlags,
    RestFlags,
    TcpState,
    Application,
    Sensor,
    Input,
    Output,
    Stime,
    StimeMsec,
    Etime,
    EtimeMsec,
    Elapsed,
    ElapsedMsec,
    FtypeClass,
    FtypeType,
    IcmpType,
    IcmpCode,
}

impl BuiltinField {
    /// Parse one field token: a name (case-insensitive) or its numeric
    /// alias from the original field numbering.
    pub fn parse(token: &str) -> Result<BuiltinField, String> {
        use BuiltinField::*;
        let t = token.trim().to_ascii_lowercase();
        let field = match t.as_str() {
            "sip" | "1" => Sip,
            "dip" | "2" => Dip,
            "sport" | "3" => Sport,
            "dport" | "4" => Dport,
            "protocol" | "proto" | "5" => Proto,
            "packets" | "pkts" | "6" => Pkts,
            "bytes" | "7" => Bytes,
            "flags" | "8" => Flags,
            "stime" | "9" => Stime,
            "duration" | "dur" | "elapsed" | "10" => Elapsed,
            "etime" | "11" => Etime,
            "sensor" | "12" => Sensor,
            "in" | "input" | "13" => Input,
            "out" | "output" | "14" => Output,
            "nhip" | "15" => Nhip,
            "initialflags" | "16" => InitFlags,
            "sessionflags" | "17" => RestFlags,
            "attributes" | "18" => TcpState,
            "application" | "19" => Application,
            "class" | "20" => FtypeClass,
            "type" | "21" => FtypeType,
            "stime+msec" | "22" => StimeMsec,
            "etime+msec" | "23" => EtimeMsec,
            "dur+msec" | "elapsed+msec" | "24" => ElapsedMsec,
            "icmptype" | "25" => IcmpType,
            "icmpcode" | "26" => IcmpCode,
            "" => return Err("empty field name".to_string()),
            _ => return Err(format!("unknown field '{}'", token.trim())),
        };
        Ok(field)
    }
}

/// Error returned by a plug-in key field.
#[derive(Debug)]
pub struct KeyFieldError(pub String);

impl fmt::Display for KeyFieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for KeyFieldError {}

/// A plug-in key field: extracts a fixed-width binary key from a record
/// and orders two such keys. The key bytes are opaque to the sorter.
pub trait KeyField {
    /// Human-readable name, used in diagnostics.
    fn name(&self) -> &str;

    /// Width of the binary key in bytes. Fixed for the life of the field.
    fn width(&self) -> usize;

    /// Write exactly `width()` bytes of key material for `rec` (the raw
    /// record bytes) into `dst`.
    fn rec_to_bin(&self, rec: &[u8], dst: &mut [u8]) -> Result<(), KeyFieldError>;

    /// Order two previously extracted keys of `width()` bytes each.
    fn bin_compare(&self, a: &[u8], b: &[u8]) -> Result<Ordering, KeyFieldError>;
}

/// One entry of the composite sort key, as supplied by the caller.
/// Plug-in offsets within the node are assigned by the sort plan.
#[derive(Clone)]
pub enum FieldSpec {
    Builtin(BuiltinField),
    Plugin(Arc<dyn KeyField>),
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSpec::Builtin(tag) => write!(f, "Builtin({tag:?})"),
            FieldSpec::Plugin(p) => write!(f, "Plugin({})", p.name()),
        }
    }
}

/// Parse a comma-separated `--fields` list into built-in field specs.
pub fn parse_fields(spec: &str) -> Result<Vec<FieldSpec>, String> {
    if spec.trim().is_empty() {
        return Err("no fields given".to_string());
    }
    spec.split(',')
        .map(|tok| BuiltinField::parse(tok).map(FieldSpec::Builtin))
        .collect()
}

/// Largest node (record plus plug-in key bytes) the sorter supports.
/// Sizes the per-reader scratch slots in the merger.
pub const MAX_NODE_SIZE: usize = 256;
