use tilegpu_hw::regs::AttributeControl;
use tilegpu_hw::DataType;

use crate::error::VertexError;

/// One vertex attribute stream as laid out in client memory.
#[derive(Debug, Clone, Copy)]
pub struct VertexAttribute<'a> {
    pub data_type: DataType,
    /// Components per vertex, 1..=4.
    pub components: u32,
    /// Bytes between consecutive vertices. Zero repeats the first element for every vertex.
    pub stride: usize,
    pub data: &'a [u8],
}

impl<'a> VertexAttribute<'a> {
    pub fn new(data_type: DataType, components: u32, stride: usize, data: &'a [u8]) -> Self {
        Self {
            data_type,
            components,
            stride,
            data,
        }
    }

    pub fn element_bytes(&self) -> usize {
        self.data_type.byte_width() * self.components as usize
    }

    pub(crate) fn is_word_aligned(&self) -> bool {
        self.data.as_ptr() as usize % 4 == 0
    }

    pub(crate) fn view(&self) -> StridedView<'a> {
        StridedView::new(self.data, self.stride, self.element_bytes())
    }

    pub(crate) fn control(&self, last: bool) -> AttributeControl {
        let mut ctl = AttributeControl::new(self.data_type, self.components);
        ctl.set_last(last);
        ctl
    }

    /// Check the attribute shape and that vertex `max_index` is readable.
    pub(crate) fn validate(&self, slot: usize, max_index: u32) -> Result<(), VertexError> {
        if !(1..=4).contains(&self.components) {
            return Err(VertexError::InvalidComponents {
                slot,
                components: self.components,
            });
        }
        if self.stride > 0xff {
            return Err(VertexError::StrideTooLarge {
                slot,
                stride: self.stride,
            });
        }
        if self.view().get(max_index as usize).is_none() {
            return Err(VertexError::OutOfBounds {
                slot,
                index: max_index,
                len: self.data.len(),
            });
        }
        Ok(())
    }
}

/// Index data for indexed draws.
#[derive(Debug, Clone, Copy)]
pub enum Indices<'a> {
    U8(&'a [u8]),
    U16(&'a [u16]),
}

impl Indices<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::U8(i) => i.len(),
            Self::U16(i) => i.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_u32(&self) -> Vec<u32> {
        match self {
            Self::U8(i) => i.iter().map(|&v| u32::from(v)).collect(),
            Self::U16(i) => i.iter().map(|&v| u32::from(v)).collect(),
        }
    }
}

/// Bounds-checked view over strided attribute data.
///
/// Vertex `i` starts `i * stride` bytes into the data and is `element` bytes long. A zero stride
/// makes every vertex alias the first element.
#[derive(Debug, Clone, Copy)]
pub struct StridedView<'a> {
    data: &'a [u8],
    stride: usize,
    element: usize,
}

impl<'a> StridedView<'a> {
    pub fn new(data: &'a [u8], stride: usize, element: usize) -> Self {
        Self {
            data,
            stride,
            element,
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn element_bytes(&self) -> usize {
        self.element
    }

    fn start(&self, index: usize) -> Option<usize> {
        index.checked_mul(self.stride)
    }

    /// Element bytes of vertex `index`.
    pub fn get(&self, index: usize) -> Option<&'a [u8]> {
        let start = self.start(index)?;
        self.data.get(start..start.checked_add(self.element)?)
    }

    /// Up to `len` bytes starting at vertex `index`, clipped to the end of the data.
    pub fn span(&self, index: usize, len: usize) -> &'a [u8] {
        let start = self.start(index).unwrap_or(usize::MAX).min(self.data.len());
        let end = start.saturating_add(len).min(self.data.len());
        &self.data[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_rejects_elements_past_the_end() {
        let data = [0u8; 20];
        let view = StridedView::new(&data, 8, 4);
        assert_eq!(view.get(2), Some(&data[16..20]));
        assert_eq!(view.get(3), None);
        assert_eq!(view.span(2, 8).len(), 4);
    }

    #[test]
    fn zero_stride_aliases_the_first_element() {
        let data = [1u8, 2, 3];
        let view = StridedView::new(&data, 0, 3);
        assert_eq!(view.get(1_000_000), Some(&data[..]));
    }

    #[test]
    fn validate_reports_the_failing_slot() {
        let data = [0u8; 16];
        let attr = VertexAttribute::new(DataType::Float, 2, 8, &data);
        assert_eq!(attr.validate(3, 1), Ok(()));
        assert_eq!(
            attr.validate(3, 2),
            Err(VertexError::OutOfBounds {
                slot: 3,
                index: 2,
                len: 16
            })
        );

        let bad = VertexAttribute::new(DataType::Float, 5, 8, &data);
        assert!(matches!(
            bad.validate(0, 0),
            Err(VertexError::InvalidComponents { components: 5, .. })
        ));
    }
}
