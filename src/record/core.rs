/// Fixed-width flow record layout and stream codec.
///
/// A record is an 88-byte big-endian block. Sort nodes carry the record in
/// their first FLOW_REC_SIZE bytes, so the accessors here operate directly
/// on raw bytes without decoding the whole record.
use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, StdinLock, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use memmap2::Mmap;

use crate::common::io::{mmap_file, should_mmap};

/// Width of one flow record on the wire and in memory.
pub const FLOW_REC_SIZE: usize = 88;

/// Stream header: magic, version, record size (BE u16), one reserved byte.
pub const STREAM_MAGIC: [u8; 4] = *b"FFLW";
pub const STREAM_VERSION: u8 = 1;
pub const STREAM_HEADER_SIZE: usize = 8;

// Field offsets within a record. Addresses are 16 bytes, IPv4 zero-extended.
const OFF_SIP: usize = 0;
const OFF_DIP: usize = 16;
const OFF_NHIP: usize = 32;
const OFF_SPORT: usize = 48;
const OFF_DPORT: usize = 50;
const OFF_PROTO: usize = 52;
const OFF_FLAGS: usize = 53;
const OFF_INIT_FLAGS: usize = 54;
const OFF_REST_FLAGS: usize = 55;
const OFF_TCP_STATE: usize = 56;
const OFF_FLOWTYPE: usize = 57;
const OFF_SENSOR: usize = 58;
const OFF_APPLICATION: usize = 60;
const OFF_INPUT: usize = 62;
const OFF_OUTPUT: usize = 64;
const OFF_PKTS: usize = 66;
const OFF_BYTES: usize = 70;
const OFF_STIME: usize = 74;
const OFF_ELAPSED: usize = 82;

const PROTO_ICMP: u8 = 1;
const PROTO_ICMPV6: u8 = 58;

#[inline]
fn be16(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([buf[off], buf[off + 1]])
}

#[inline]
fn be32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

#[inline]
fn be64(buf: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    u64::from_be_bytes(b)
}

/// Zero-copy view over the record prefix of a node or record buffer.
/// All getters read big-endian values straight from the bytes.
#[derive(Clone, Copy)]
pub struct RecView<'a>(pub &'a [u8]);

impl<'a> RecView<'a> {
    #[inline]
    pub fn sip(&self) -> &'a [u8] {
        &self.0[OFF_SIP..OFF_SIP + 16]
    }

    #[inline]
    pub fn dip(&self) -> &'a [u8] {
        &self.0[OFF_DIP..OFF_DIP + 16]
    }

    #[inline]
    pub fn nhip(&self) -> &'a [u8] {
        &self.0[OFF_NHIP..OFF_NHIP + 16]
    }

    #[inline]
    pub fn sport(&self) -> u16 {
        be16(self.0, OFF_SPORT)
    }

    #[inline]
    pub fn dport(&self) -> u16 {
        be16(self.0, OFF_DPORT)
    }

    #[inline]
    pub fn proto(&self) -> u8 {
        self.0[OFF_PROTO]
    }

    #[inline]
    pub fn flags(&self) -> u8 {
        self.0[OFF_FLAGS]
    }

    #[inline]
    pub fn init_flags(&self) -> u8 {
        self.0[OFF_INIT_FLAGS]
    }

    #[inline]
    pub fn rest_flags(&self) -> u8 {
        self.0[OFF_REST_FLAGS]
    }

    #[inline]
    pub fn tcp_state(&self) -> u8 {
        self.0[OFF_TCP_STATE]
    }

    #[inline]
    pub fn flowtype(&self) -> u8 {
        self.0[OFF_FLOWTYPE]
    }

    #[inline]
    pub fn sensor(&self) -> u16 {
        be16(self.0, OFF_SENSOR)
    }

    #[inline]
    pub fn application(&self) -> u16 {
        be16(self.0, OFF_APPLICATION)
    }

    #[inline]
    pub fn input(&self) -> u16 {
        be16(self.0, OFF_INPUT)
    }

    #[inline]
    pub fn output(&self) -> u16 {
        be16(self.0, OFF_OUTPUT)
    }

    #[inline]
    pub fn pkts(&self) -> u32 {
        be32(self.0, OFF_PKTS)
    }

    #[inline]
    pub fn bytes(&self) -> u32 {
        be32(self.0, OFF_BYTES)
    }

    /// Start time, epoch milliseconds. The msec display variant shares
    /// this accessor: the stored value already carries millisecond
    /// precision.
    #[inline]
    pub fn stime(&self) -> u64 {
        be64(self.0, OFF_STIME)
    }

    /// Flow duration in milliseconds.
    #[inline]
    pub fn elapsed(&self) -> u32 {
        be32(self.0, OFF_ELAPSED)
    }

    /// End time, derived: never materialized in the record.
    #[inline]
    pub fn etime(&self) -> u64 {
        self.stime() + self.elapsed() as u64
    }

    #[inline]
    pub fn is_icmp(&self) -> bool {
        matches!(self.proto(), PROTO_ICMP | PROTO_ICMPV6)
    }

    /// ICMP message type, carried in the high byte of dport.
    /// Zero for non-ICMP records so the field always has a defined order.
    #[inline]
    pub fn icmp_type(&self) -> u8 {
        if self.is_icmp() {
            (self.dport() >> 8) as u8
        } else {
            0
        }
    }

    /// ICMP message code, carried in the low byte of dport.
    #[inline]
    pub fn icmp_code(&self) -> u8 {
        if self.is_icmp() {
            (self.dport() & 0xff) as u8
        } else {
            0
        }
    }
}

/// Owned, typed flow record. Used to build records (tests, generators) and
/// to decode them; the sorter itself works on raw bytes via RecView.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRec {
    pub sip: IpAddr,
    pub dip: IpAddr,
    pub nhip: IpAddr,
    pub sport: u16,
    pub dport: u16,
    pub proto: u8,
    pub flags: u8,
    pub init_flags: u8,
    pub rest_flags: u8,
    pub tcp_state: u8,
    pub flowtype: u8,
    pub sensor: u16,
    pub application: u16,
    pub input: u16,
    pub output: u16,
    pub pkts: u32,
    pub bytes: u32,
    pub stime_ms: u64,
    pub elapsed_ms: u32,
}

impl Default for FlowRec {
    fn default() -> Self {
        FlowRec {
            sip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            dip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            nhip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            sport: 0,
            dport: 0,
            proto: 0,
            flags: 0,
            init_flags: 0,
            rest_flags: 0,
            tcp_state: 0,
            flowtype: 0,
            sensor: 0,
            application: 0,
            input: 0,
            output: 0,
            pkts: 0,
            bytes: 0,
            stime_ms: 0,
            elapsed_ms: 0,
        }
    }
}

/// Pack an address into 16 bytes, zero-extending IPv4 so mixed-family
/// inputs share one total order.
fn encode_addr(addr: &IpAddr, dst: &mut [u8]) {
    match addr {
        IpAddr::V4(v4) => {
            dst[..12].fill(0);
            dst[12..16].copy_from_slice(&v4.octets());
        }
        IpAddr::V6(v6) => dst[..16].copy_from_slice(&v6.octets()),
    }
}

fn decode_addr(src: &[u8]) -> IpAddr {
    if src[..12].iter().all(|&b| b == 0) {
        IpAddr::V4(Ipv4Addr::new(src[12], src[13], src[14], src[15]))
    } else {
        let mut b = [0u8; 16];
        b.copy_from_slice(&src[..16]);
        IpAddr::V6(Ipv6Addr::from(b))
    }
}

impl FlowRec {
    /// Serialize into `buf`, which must be at least FLOW_REC_SIZE bytes.
    pub fn encode(&self, buf: &mut [u8]) {
        let buf = &mut buf[..FLOW_REC_SIZE];
        buf.fill(0);
        encode_addr(&self.sip, &mut buf[OFF_SIP..]);
        encode_addr(&self.dip, &mut buf[OFF_DIP..]);
        encode_addr(&self.nhip, &mut buf[OFF_NHIP..]);
        buf[OFF_SPORT..OFF_SPORT + 2].copy_from_slice(&self.sport.to_be_bytes());
        buf[OFF_DPORT..OFF_DPORT + 2].copy_from_slice(&self.dport.to_be_bytes());
        buf[OFF_PROTO] = self.proto;
        buf[OFF_FLAGS] = self.flags;
        buf[OFF_INIT_FLAGS] = self.init_flags;
        buf[OFF_REST_FLAGS] = self.rest_flags;
        buf[OFF_TCP_STATE] = self.tcp_state;
        buf[OFF_FLOWTYPE] = self.flowtype;
        buf[OFF_SENSOR..OFF_SENSOR + 2].copy_from_slice(&self.sensor.to_be_bytes());
        buf[OFF_APPLICATION..OFF_APPLICATION + 2]
            .copy_from_slice(&self.application.to_be_bytes());
        buf[OFF_INPUT..OFF_INPUT + 2].copy_from_slice(&self.input.to_be_bytes());
        buf[OFF_OUTPUT..OFF_OUTPUT + 2].copy_from_slice(&self.output.to_be_bytes());
        buf[OFF_PKTS..OFF_PKTS + 4].copy_from_slice(&self.pkts.to_be_bytes());
        buf[OFF_BYTES..OFF_BYTES + 4].copy_from_slice(&self.bytes.to_be_bytes());
        buf[OFF_STIME..OFF_STIME + 8].copy_from_slice(&self.stime_ms.to_be_bytes());
        buf[OFF_ELAPSED..OFF_ELAPSED + 4].copy_from_slice(&self.elapsed_ms.to_be_bytes());
    }

    pub fn to_bytes(&self) -> [u8; FLOW_REC_SIZE] {
        let mut buf = [0u8; FLOW_REC_SIZE];
        self.encode(&mut buf);
        buf
    }

    pub fn decode(buf: &[u8]) -> FlowRec {
        let v = RecView(buf);
        FlowRec {
            sip: decode_addr(v.sip()),
            dip: decode_addr(v.dip()),
            nhip: decode_addr(v.nhip()),
            sport: v.sport(),
            dport: v.dport(),
            proto: v.proto(),
            flags: v.flags(),
            init_flags: v.init_flags(),
            rest_flags: v.rest_flags(),
            tcp_state: v.tcp_state(),
            flowtype: v.flowtype(),
            sensor: v.sensor(),
            application: v.application(),
            input: v.input(),
            output: v.output(),
            pkts: v.pkts(),
            bytes: v.bytes(),
            stime_ms: v.stime(),
            elapsed_ms: v.elapsed(),
        }
    }
}

/// Input byte source: mmap for large regular files (zero syscalls per
/// record), buffered reads for stdin and small files.
enum InputSource {
    Mmap { map: Mmap, pos: usize },
    File(BufReader<File>),
    Stdin(BufReader<StdinLock<'static>>),
}

impl InputSource {
    /// Fill `buf` completely, or return false on clean EOF at a block
    /// boundary. EOF in the middle of a block is an error.
    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        match self {
            InputSource::Mmap { map, pos } => {
                let remaining = map.len() - *pos;
                if remaining == 0 {
                    return Ok(false);
                }
                if remaining < buf.len() {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "truncated record at end of stream",
                    ));
                }
                buf.copy_from_slice(&map[*pos..*pos + buf.len()]);
                *pos += buf.len();
                Ok(true)
            }
            InputSource::File(r) => read_block_from(r, buf),
            InputSource::Stdin(r) => read_block_from(r, buf),
        }
    }
}

pub(crate) fn read_block_from<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                "truncated record at end of stream",
            ));
        }
        filled += n;
    }
    Ok(true)
}

/// Reader for one flow record stream.
///
/// Validates the stream header at open; a zero-byte stream is accepted as
/// an empty stream with no records.
pub struct RecordReader {
    src: InputSource,
    path: String,
    exhausted: bool,
}

impl RecordReader {
    /// Open `path`, with "-" meaning standard input.
    pub fn open(path: &str) -> io::Result<RecordReader> {
        let src = if path == "-" {
            InputSource::Stdin(BufReader::with_capacity(256 * 1024, io::stdin().lock()))
        } else if should_mmap(Path::new(path)) {
            let file = File::open(path)?;
            InputSource::Mmap {
                map: mmap_file(&file)?,
                pos: 0,
            }
        } else {
            InputSource::File(BufReader::with_capacity(256 * 1024, File::open(path)?))
        };

        let mut reader = RecordReader {
            src,
            path: path.to_string(),
            exhausted: false,
        };
        reader.read_header()?;
        Ok(reader)
    }

    fn read_header(&mut self) -> io::Result<()> {
        let mut header = [0u8; STREAM_HEADER_SIZE];
        if !self.src.read_block(&mut header)? {
            // Zero-byte stream: no records, not an error.
            self.exhausted = true;
            return Ok(());
        }
        if header[..4] != STREAM_MAGIC {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                "not a flow record stream (bad magic)",
            ));
        }
        if header[4] != STREAM_VERSION {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("unsupported stream version {}", header[4]),
            ));
        }
        let rec_size = be16(&header, 5) as usize;
        if rec_size != FLOW_REC_SIZE {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("unexpected record size {rec_size} in stream header"),
            ));
        }
        Ok(())
    }

    /// Read the next record's raw bytes into `buf` (at least FLOW_REC_SIZE
    /// bytes). Returns false at end of stream.
    pub fn read_into(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        if self.exhausted {
            return Ok(false);
        }
        let got = self.src.read_block(&mut buf[..FLOW_REC_SIZE])?;
        if !got {
            self.exhausted = true;
        }
        Ok(got)
    }

    /// Read and decode the next record. Returns None at end of stream.
    pub fn read_record(&mut self) -> io::Result<Option<FlowRec>> {
        let mut buf = [0u8; FLOW_REC_SIZE];
        if self.read_into(&mut buf)? {
            Ok(Some(FlowRec::decode(&buf)))
        } else {
            Ok(None)
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Writer for a flow record stream. The header is written lazily before
/// the first record; `write_header` finalizes an empty output so the
/// stream is well formed even with zero records.
pub struct RecordWriter<W: Write> {
    inner: W,
    header_written: bool,
    count: u64,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> RecordWriter<W> {
        RecordWriter {
            inner,
            header_written: false,
            count: 0,
        }
    }

    /// Write the stream header if it has not been written yet.
    pub fn write_header(&mut self) -> io::Result<()> {
        if self.header_written {
            return Ok(());
        }
        let mut header = [0u8; STREAM_HEADER_SIZE];
        header[..4].copy_from_slice(&STREAM_MAGIC);
        header[4] = STREAM_VERSION;
        header[5..7].copy_from_slice(&(FLOW_REC_SIZE as u16).to_be_bytes());
        self.inner.write_all(&header)?;
        self.header_written = true;
        Ok(())
    }

    /// Write the record portion of a sort node (the first FLOW_REC_SIZE
    /// bytes); trailing key bytes never reach the output.
    pub fn write_node(&mut self, node: &[u8]) -> io::Result<()> {
        self.write_header()?;
        self.inner.write_all(&node[..FLOW_REC_SIZE])?;
        self.count += 1;
        Ok(())
    }

    pub fn write_record(&mut self, rec: &FlowRec) -> io::Result<()> {
        self.write_node(&rec.to_bytes())
    }

    /// Number of records written so far.
    pub fn record_count(&self) -> u64 {
        self.count
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Output sink enum to avoid Box<dyn Write> vtable dispatch overhead.
pub enum OutputSink {
    Stdout(BufWriter<io::StdoutLock<'static>>),
    File(BufWriter<File>),
}

impl OutputSink {
    /// 4MB buffer for output, matching the input side's appetite.
    const BUF_SIZE: usize = 4 * 1024 * 1024;

    /// Create a sink for `path`, with None meaning standard output.
    pub fn create(path: Option<&Path>) -> io::Result<OutputSink> {
        Ok(match path {
            Some(p) => OutputSink::File(BufWriter::with_capacity(
                Self::BUF_SIZE,
                File::create(p)?,
            )),
            None => OutputSink::Stdout(BufWriter::with_capacity(
                Self::BUF_SIZE,
                io::stdout().lock(),
            )),
        })
    }
}

impl Write for OutputSink {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::Stdout(w) => w.write(buf),
            OutputSink::File(w) => w.write(buf),
        }
    }

    #[inline]
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            OutputSink::Stdout(w) => w.write_all(buf),
            OutputSink::File(w) => w.write_all(buf),
        }
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Stdout(w) => w.flush(),
            OutputSink::File(w) => w.flush(),
        }
    }
}
