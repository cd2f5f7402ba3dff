/// Field storage used by [`register!`] accessors.
pub trait FieldValue: Copy {
    fn from_raw(raw: u32) -> Self;
    fn into_raw(self) -> u32;
}

impl FieldValue for bool {
    #[inline]
    fn from_raw(raw: u32) -> Self {
        raw != 0
    }

    #[inline]
    fn into_raw(self) -> u32 {
        self as u32
    }
}

impl FieldValue for u32 {
    #[inline]
    fn from_raw(raw: u32) -> Self {
        raw
    }

    #[inline]
    fn into_raw(self) -> u32 {
        self
    }
}

/// Mask covering bits `lo..=hi` once shifted down to bit 0.
#[inline]
pub const fn field_mask(lo: u32, hi: u32) -> u32 {
    let width = hi - lo + 1;
    if width >= 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}

/// Declares a bit-packed register value backed by a single `u32`.
///
/// Each field lists its getter, its setter, the Rust type it is exposed as (`bool` or `u32`)
/// and its bit position (`@ bit` or `@ lo..=hi`). Setters mask the value to the field width and
/// return `&mut Self` so updates can be chained.
#[macro_export]
macro_rules! register {
    (@hi $lo:literal) => {
        $lo
    };
    (@hi $lo:literal $hi:literal) => {
        $hi
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $get:ident, $set:ident : $ty:ident @ $lo:literal $(..= $hi:literal)?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
        $vis struct $name(u32);

        impl $name {
            pub const fn from_bits(bits: u32) -> Self {
                Self(bits)
            }

            pub const fn bits(self) -> u32 {
                self.0
            }

            $(
                $(#[$fmeta])*
                #[inline]
                pub fn $get(self) -> $ty {
                    let lo: u32 = $lo;
                    let hi: u32 = $crate::register!(@hi $lo $($hi)?);
                    <$ty as $crate::FieldValue>::from_raw(
                        (self.0 >> lo) & $crate::field_mask(lo, hi),
                    )
                }

                #[inline]
                pub fn $set(&mut self, value: $ty) -> &mut Self {
                    let lo: u32 = $lo;
                    let hi: u32 = $crate::register!(@hi $lo $($hi)?);
                    let mask = $crate::field_mask(lo, hi) << lo;
                    let raw = <$ty as $crate::FieldValue>::into_raw(value);
                    self.0 = (self.0 & !mask) | ((raw << lo) & mask);
                    self
                }
            )*
        }

        impl ::core::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.debug_struct(stringify!($name))
                    $(.field(stringify!($get), &self.$get()))*
                    .finish()
            }
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value.0
            }
        }
    };
}
