/// Node comparison: the composite key applied left to right over raw
/// node bytes, with the global reverse flag folded into the first
/// non-equal result.
use std::cell::Cell;
use std::cmp::Ordering;

use super::core::SortError;
use super::plan::{SortField, SortPlan};
use crate::record::RecView;

/// Order two nodes under `plan`. The first field that distinguishes the
/// nodes decides; equal nodes are permitted. Plug-in comparator failures
/// abort the sort.
pub fn compare_nodes(plan: &SortPlan, a: &[u8], b: &[u8]) -> Result<Ordering, SortError> {
    let ra = RecView(a);
    let rb = RecView(b);

    for field in plan.fields() {
        let ord = match field {
            SortField::Builtin(tag) => compare_builtin(*tag, ra, rb),
            SortField::Plugin {
                field,
                offset,
                width,
            } => field
                .bin_compare(&a[*offset..*offset + *width], &b[*offset..*offset + *width])
                .map_err(|e| SortError::Plugin {
                    field: field.name().to_string(),
                    op: "comparing binary values",
                    source: e,
                })?,
        };
        if ord != Ordering::Equal {
            return Ok(if plan.reverse() { ord.reverse() } else { ord });
        }
    }

    Ok(Ordering::Equal)
}

/// Compare one built-in field of two records.
///
/// Addresses compare by their full 16-byte width, so mixed-family inputs
/// share a total order. The msec time variants compare like their base
/// field: the stored values already carry millisecond precision. End time
/// is derived from start time and duration at comparison time.
fn compare_builtin(tag: super::field::BuiltinField, a: RecView<'_>, b: RecView<'_>) -> Ordering {
    use super::field::BuiltinField::*;
    match tag {
        Sip => a.sip().cmp(b.sip()),
        Dip => a.dip().cmp(b.dip()),
        Nhip => a.nhip().cmp(b.nhip()),
        Sport => a.sport().cmp(&b.sport()),
        Dport => a.dport().cmp(&b.dport()),
        Proto => a.proto().cmp(&b.proto()),
        Pkts => a.pkts().cmp(&b.pkts()),
        Bytes => a.bytes().cmp(&b.bytes()),
        Flags => a.flags().cmp(&b.flags()),
        InitFlags => a.init_flags().cmp(&b.init_flags()),
        RestFlags => a.rest_flags().cmp(&b.rest_flags()),
        TcpState => a.tcp_state().cmp(&b.tcp_state()),
        Application => a.application().cmp(&b.application()),
        Sensor => a.sensor().cmp(&b.sensor()),
        Input => a.input().cmp(&b.input()),
        Output => a.output().cmp(&b.output()),
        Stime | StimeMsec => a.stime().cmp(&b.stime()),
        Etime | EtimeMsec => a.etime().cmp(&b.etime()),
        Elapsed | ElapsedMsec => a.elapsed().cmp(&b.elapsed()),
        FtypeClass | FtypeType => a.flowtype().cmp(&b.flowtype()),
        IcmpType => a.icmp_type().cmp(&b.icmp_type()),
        IcmpCode => a.icmp_code().cmp(&b.icmp_code()),
    }
}

/// Comparator wrapper for contexts that demand an infallible `Ordering`
/// (slice sorts, the merge heap). The first plug-in failure is latched
/// and Equal returned; callers check the latch at the next safe point and
/// abort the sort.
pub struct NodeComparator<'a> {
    plan: &'a SortPlan,
    err: Cell<Option<SortError>>,
}

impl<'a> NodeComparator<'a> {
    pub fn new(plan: &'a SortPlan) -> NodeComparator<'a> {
        NodeComparator {
            plan,
            err: Cell::new(None),
        }
    }

    #[inline]
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match compare_nodes(self.plan, a, b) {
            Ok(ord) => ord,
            Err(e) => {
                // keep the first failure
                let prev = self.err.take();
                self.err.set(Some(prev.unwrap_or(e)));
                Ordering::Equal
            }
        }
    }

    /// Surface a latched failure, if any.
    pub fn check(&self) -> Result<(), SortError> {
        match self.err.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
