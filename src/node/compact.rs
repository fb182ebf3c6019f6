// Compaction: repacking a node into one dense, native-endian buffer

use bytes::BytesMut;
use tracing::debug;

use crate::codec::transcode;
use crate::dtype::DataType;
use crate::internal::error::{Error, Result};
use crate::node::Node;
use crate::schema::Schema;
use crate::storage::{self, Storage};

/// Copies every element described by `from` in `src` to the position `to`
/// describes in `dst`, converting byte order on the way. The two descriptors
/// must be compatible.
pub(crate) fn copy_elements(src: &[u8], from: &DataType, dst: &mut [u8], to: &DataType) -> Result<()> {
    if src.len() < from.spanned_bytes() {
        return Err(Error::TruncatedData {
            required: from.spanned_bytes(),
            available: src.len(),
        });
    }
    if dst.len() < to.spanned_bytes() {
        return Err(Error::TruncatedData {
            required: to.spanned_bytes(),
            available: dst.len(),
        });
    }
    let width = from.element_bytes();
    for index in 0..from.number_of_elements() {
        let source = from.element_offset(index);
        let target = to.element_offset(index);
        transcode(
            &src[source..source + width],
            from.endianness(),
            &mut dst[target..target + width],
            to.endianness(),
        );
    }
    Ok(())
}

impl Node {
    /// A deep copy with a packed, native-endian layout in fresh owned
    /// storage. The original node is left untouched.
    pub fn compact(&self) -> Result<Node> {
        let (schema, buffer) = self.packed()?;
        Ok(Node::from_layout(&schema, &Storage::from_bytes(buffer).into_shared()))
    }

    /// Replaces `target` with the compacted form of this node. `target` is
    /// left as it was on failure.
    pub fn compact_to(&self, target: &mut Node) -> Result<()> {
        let compacted = self.compact()?;
        target.replace_content(compacted.content);
        Ok(())
    }

    /// The compacted schema and the packed bytes it describes.
    pub(crate) fn packed(&self) -> Result<(Schema, BytesMut)> {
        let schema = self.schema().compacted();
        let mut buffer = BytesMut::zeroed(schema.spanned_bytes());
        for (leaf, (_, target)) in self.leaves().into_iter().zip(schema.leaves()) {
            let storage = storage::borrow(&leaf.storage)?;
            copy_elements(storage.as_bytes(), &leaf.dtype, &mut buffer, target)?;
        }
        debug!(n_bytes = buffer.len(), "packed node");
        Ok((schema, buffer))
    }

    /// Fails if any leaf's storage is held by a live mutable slice.
    pub(crate) fn check_readable(&self) -> Result<()> {
        for leaf in self.leaves() {
            storage::borrow(&leaf.storage)?;
        }
        Ok(())
    }
}
