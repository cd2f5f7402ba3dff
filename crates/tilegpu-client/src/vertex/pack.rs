//! Packing attribute data into vertex buffer words.
//!
//! Each strategy appends little-endian words for a run of vertices. The caller pads the run to
//! the vertex buffer transfer granularity with [`pad_to_transfer`].

use tilegpu_hw::mmio;

use super::attrib::{StridedView, VertexAttribute};

/// How one attribute's data reaches the vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackStrategy {
    /// Zero stride: one element serves every vertex.
    Constant,
    /// Word-aligned source whose stride is a whole number of words up to 16 bytes: the source
    /// records are copied verbatim.
    Burst,
    /// Any other array source: elements are repacked to a word-rounded stride.
    Packed,
    /// Indexed source with a 4, 8, 12 or 16 byte stride: whole records gathered by index.
    GatherFixed,
    /// Indexed source with any other stride: elements gathered byte by byte.
    GatherGeneric,
}

pub(crate) const fn round_up(n: usize, align: usize) -> usize {
    n.div_ceil(align) * align
}

impl PackStrategy {
    pub fn select(attr: &VertexAttribute<'_>, indexed: bool) -> Self {
        let stride = attr.stride;
        let record_fits = attr.element_bytes() <= stride;
        if stride == 0 {
            Self::Constant
        } else if indexed {
            if gather_kernel(stride).is_some() && record_fits {
                Self::GatherFixed
            } else {
                Self::GatherGeneric
            }
        } else if stride % 4 == 0
            && stride <= mmio::VB_MAX_ELEMENT_BYTES
            && record_fits
            && attr.is_word_aligned()
        {
            Self::Burst
        } else {
            Self::Packed
        }
    }

    /// Stride of the packed data in the vertex buffer.
    pub fn vb_stride(self, attr: &VertexAttribute<'_>, constant_optimization: bool) -> usize {
        match self {
            Self::Constant if constant_optimization => 0,
            Self::Burst | Self::GatherFixed => attr.stride,
            Self::Constant | Self::Packed | Self::GatherGeneric => round_up(attr.element_bytes(), 4),
        }
    }
}

/// Vertices selected for one batch.
#[derive(Debug, Clone, Copy)]
pub enum Selection<'a> {
    Range { first: usize, count: usize },
    Indexed(&'a [u32]),
}

impl Selection<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Range { count, .. } => *count,
            Self::Indexed(indices) => indices.len(),
        }
    }
}

#[inline]
fn word(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Little-endian word from up to four bytes, zero-filled.
#[inline]
fn partial_word(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .enumerate()
        .fold(0, |w, (i, &b)| w | u32::from(b) << (8 * i))
}

/// Append one element, assembling words according to the component width.
pub(crate) fn push_element(width: usize, element: &[u8], out: &mut Vec<u32>) {
    match width {
        4 => out.extend(element.chunks_exact(4).map(|w| word(w, 0))),
        2 => out.extend(element.chunks(4).map(|pair| {
            let lo = u16::from_le_bytes([pair[0], pair[1]]);
            let hi = pair
                .get(2..4)
                .map_or(0, |h| u16::from_le_bytes([h[0], h[1]]));
            u32::from(lo) | u32::from(hi) << 16
        })),
        _ => out.extend(element.chunks(4).map(partial_word)),
    }
}

/// Append `count` copies (or one, for a zero vertex buffer stride) of the first element.
pub(crate) fn pack_constant(attr: &VertexAttribute<'_>, copies: usize, out: &mut Vec<u32>) {
    let Some(element) = attr.view().get(0) else {
        return;
    };
    let width = attr.data_type.byte_width();
    let start = out.len();
    push_element(width, element, out);
    let end = out.len();
    for _ in 1..copies {
        out.extend_from_within(start..end);
    }
}

/// Copy `count` whole records starting at vertex `first`, four words per step.
pub(crate) fn burst_copy(view: &StridedView<'_>, first: usize, count: usize, out: &mut Vec<u32>) {
    let len = count * view.stride();
    let src = view.span(first, len);
    let mut quads = src.chunks_exact(16);
    for q in &mut quads {
        out.extend_from_slice(&[word(q, 0), word(q, 4), word(q, 8), word(q, 12)]);
    }
    out.extend(quads.remainder().chunks(4).map(partial_word));
    // The final record may extend past the source; only its element bytes are meaningful.
    let words = len / 4;
    let copied = src.len().div_ceil(4);
    out.extend(std::iter::repeat(0).take(words.saturating_sub(copied)));
}

/// Repack the elements of `count` vertices starting at `first` to a word-rounded stride.
pub(crate) fn pack_strided(
    attr: &VertexAttribute<'_>,
    first: usize,
    count: usize,
    out: &mut Vec<u32>,
) {
    let view = attr.view();
    let width = attr.data_type.byte_width();
    for index in first..first + count {
        if let Some(element) = view.get(index) {
            push_element(width, element, out);
        }
    }
}

fn load_record<const STRIDE: usize>(view: &StridedView<'_>, index: u32) -> [u8; STRIDE] {
    let mut record = [0u8; STRIDE];
    let src = view.span(index as usize, STRIDE);
    record[..src.len()].copy_from_slice(src);
    record
}

fn push_record<const STRIDE: usize>(record: &[u8; STRIDE], out: &mut Vec<u32>) {
    out.extend(record.chunks_exact(4).map(|w| word(w, 0)));
}

/// Gather whole `STRIDE`-byte records by index, four indices per step.
pub(crate) fn gather_fixed<const STRIDE: usize>(
    view: &StridedView<'_>,
    indices: &[u32],
    out: &mut Vec<u32>,
) {
    let mut quads = indices.chunks_exact(4);
    for q in &mut quads {
        let records = [
            load_record::<STRIDE>(view, q[0]),
            load_record::<STRIDE>(view, q[1]),
            load_record::<STRIDE>(view, q[2]),
            load_record::<STRIDE>(view, q[3]),
        ];
        for record in &records {
            push_record(record, out);
        }
    }
    for &index in quads.remainder() {
        push_record(&load_record::<STRIDE>(view, index), out);
    }
}

pub(crate) type GatherKernel = fn(&StridedView<'_>, &[u32], &mut Vec<u32>);

/// Specialized gather for `stride`, if one exists.
pub(crate) fn gather_kernel(stride: usize) -> Option<GatherKernel> {
    match stride {
        4 => Some(gather_fixed::<4>),
        8 => Some(gather_fixed::<8>),
        12 => Some(gather_fixed::<12>),
        16 => Some(gather_fixed::<16>),
        _ => None,
    }
}

/// Gather elements by index, byte by byte, to a word-rounded stride.
pub(crate) fn gather_generic(view: &StridedView<'_>, indices: &[u32], out: &mut Vec<u32>) {
    for &index in indices {
        if let Some(element) = view.get(index as usize) {
            out.extend(element.chunks(4).map(partial_word));
        }
    }
}

/// Pad `out` (words written since `start`) to the vertex buffer transfer size.
pub(crate) fn pad_to_transfer(out: &mut Vec<u32>, start: usize) {
    let words = mmio::VB_TRANSFER_ALIGN_BYTES / 4;
    let written = out.len() - start;
    out.resize(start + round_up(written, words), 0);
}

/// Pack one batch of `attr` with `strategy`, padded to the transfer size.
pub(crate) fn pack_batch(
    attr: &VertexAttribute<'_>,
    strategy: PackStrategy,
    selection: Selection<'_>,
    constant_optimization: bool,
    out: &mut Vec<u32>,
) {
    let start = out.len();
    match (strategy, selection) {
        (PackStrategy::Constant, sel) => {
            let copies = if constant_optimization { 1 } else { sel.len() };
            pack_constant(attr, copies, out);
        }
        (PackStrategy::Burst, Selection::Range { first, count }) => {
            burst_copy(&attr.view(), first, count, out)
        }
        (PackStrategy::GatherFixed, Selection::Indexed(indices)) => {
            match gather_kernel(attr.stride) {
                Some(kernel) => kernel(&attr.view(), indices, out),
                None => gather_generic(&attr.view(), indices, out),
            }
        }
        (_, Selection::Range { first, count }) => pack_strided(attr, first, count, out),
        (_, Selection::Indexed(indices)) => gather_generic(&attr.view(), indices, out),
    }
    pad_to_transfer(out, start);
}
