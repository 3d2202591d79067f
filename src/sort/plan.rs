/// The sort plan: the immutable description of one sort.
///
/// Built once at startup from the field list and the reverse flag, then
/// threaded by reference through the buffer, merger, and drivers.
use std::sync::Arc;

use super::core::SortError;
use super::field::{BuiltinField, FieldSpec, KeyField, MAX_NODE_SIZE};
use crate::record::FLOW_REC_SIZE;

/// One resolved entry of the composite key. Plug-in entries carry the
/// node offset where their key bytes live.
pub enum SortField {
    Builtin(BuiltinField),
    Plugin {
        field: Arc<dyn KeyField>,
        offset: usize,
        width: usize,
    },
}

pub struct SortPlan {
    fields: Vec<SortField>,
    reverse: bool,
    node_size: usize,
}

impl SortPlan {
    /// Resolve the field specs into a plan, assigning each plug-in key
    /// its slot after the record bytes. Rejects empty field lists and
    /// plans whose node would exceed MAX_NODE_SIZE.
    pub fn new(specs: &[FieldSpec], reverse: bool) -> Result<SortPlan, SortError> {
        if specs.is_empty() {
            return Err(SortError::Config("no sort fields specified".to_string()));
        }

        let mut fields = Vec::with_capacity(specs.len());
        let mut offset = FLOW_REC_SIZE;
        for spec in specs {
            match spec {
                FieldSpec::Builtin(tag) => fields.push(SortField::Builtin(*tag)),
                FieldSpec::Plugin(field) => {
                    let width = field.width();
                    if width == 0 {
                        return Err(SortError::Config(format!(
                            "key field {} has zero width",
                            field.name()
                        )));
                    }
                    if offset + width > MAX_NODE_SIZE {
                        return Err(SortError::Config(format!(
                            "key field {} does not fit: node would exceed {} bytes",
                            field.name(),
                            MAX_NODE_SIZE
                        )));
                    }
                    fields.push(SortField::Plugin {
                        field: Arc::clone(field),
                        offset,
                        width,
                    });
                    offset += width;
                }
            }
        }

        Ok(SortPlan {
            fields,
            reverse,
            node_size: offset,
        })
    }

    /// Width of one node: the record plus all plug-in key bytes.
    #[inline]
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    #[inline]
    pub fn reverse(&self) -> bool {
        self.reverse
    }

    #[inline]
    pub(crate) fn fields(&self) -> &[SortField] {
        &self.fields
    }

    /// Fill the plug-in key bytes of a node whose record portion is
    /// already in place. Called once per record at ingestion; built-in
    /// fields are read live from the record at compare time and need no
    /// extraction.
    pub fn fill_node(&self, node: &mut [u8]) -> Result<(), SortError> {
        let (rec, keys) = node.split_at_mut(FLOW_REC_SIZE);
        for field in &self.fields {
            if let SortField::Plugin {
                field,
                offset,
                width,
            } = field
            {
                let off = *offset - FLOW_REC_SIZE;
                let dst = &mut keys[off..off + *width];
                field.rec_to_bin(rec, dst).map_err(|e| SortError::Plugin {
                    field: field.name().to_string(),
                    op: "converting to binary",
                    source: e,
                })?;
            }
        }
        Ok(())
    }
}
