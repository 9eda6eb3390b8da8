// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::fmt;

// Unaligned integer types are integers which Rust does not provide natively.
// 24-bit integers are needed for u24 encoded packet numbers and FEC block
// numbers; the wrapper rounds storage up to the next supported width.
macro_rules! unaligned_integer_type {
    ($name:ident, $bitsize:expr, $storage_type:ty, [$($additional_conversions:ty),*]) => {
        #[allow(non_camel_case_types)]
        #[derive(Clone, Copy, PartialEq, PartialOrd, Eq, Ord, Hash, Default)]
        pub struct $name($storage_type);

        impl $name {
            pub const ZERO: Self = Self(0);
            pub const MAX: Self = Self((1 << $bitsize) - 1);

            /// Truncate the storage value into the allowed range
            #[inline]
            pub const fn new_truncated(value: $storage_type) -> Self {
                Self(value & ((1 << $bitsize) - 1))
            }

            #[inline]
            pub const fn into_inner(self) -> $storage_type {
                self.0
            }

            /// Wrapping increment within the allowed range
            #[inline]
            pub const fn wrapping_next(self) -> Self {
                Self::new_truncated(self.0.wrapping_add(1))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        #[cfg(any(test, feature = "generator"))]
        impl bolero_generator::TypeGenerator for $name {
            fn generate<D: bolero_generator::Driver>(driver: &mut D) -> Option<Self> {
                Some(Self::new_truncated(driver.produce()?))
            }
        }

        impl From<$name> for $storage_type {
            #[inline]
            fn from(value: $name) -> $storage_type {
                value.0
            }
        }

        $(
            impl From<$additional_conversions> for $name {
                #[inline]
                fn from(value: $additional_conversions) -> Self {
                    $name(value.into())
                }
            }
        )*
    };
}

unaligned_integer_type!(u24, 24, u32, [u8, u16]);

impl From<u24> for u64 {
    #[inline]
    fn from(value: u24) -> Self {
        value.0 as u64
    }
}

impl From<u24> for usize {
    #[inline]
    fn from(value: u24) -> Self {
        value.0 as usize
    }
}
