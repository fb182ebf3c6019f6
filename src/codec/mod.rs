// Codec module for arbor leaf elements
//
// Element-level transcoding between typed Rust values and the raw bytes of a
// leaf, honoring the leaf's declared byte order.

pub mod element;
pub mod types;

pub use self::element::Element;
pub use self::types::Scalar;

use crate::dtype::Endianness;

/// Copies one element of `width` bytes from `src` to `dst`, reversing the
/// byte order when the two sides disagree.
pub fn transcode(src: &[u8], from: Endianness, dst: &mut [u8], to: Endianness) {
    let width = dst.len();
    dst.copy_from_slice(&src[..width]);
    if width > 1 && from.resolve() != to.resolve() {
        dst.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcode_swaps_only_across_orders() {
        let src = [0x01, 0x02, 0x03, 0x04];
        let mut dst = [0u8; 4];

        transcode(&src, Endianness::Big, &mut dst, Endianness::Big);
        assert_eq!(dst, [0x01, 0x02, 0x03, 0x04]);

        transcode(&src, Endianness::Big, &mut dst, Endianness::Little);
        assert_eq!(dst, [0x04, 0x03, 0x02, 0x01]);

        let mut one = [0u8; 1];
        transcode(&[0x7f], Endianness::Big, &mut one, Endianness::Little);
        assert_eq!(one, [0x7f]);
    }
}
