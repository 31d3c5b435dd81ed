//! Declarative macros for record mapping.
//!
//! `impl_record!` expands a field/column table into a [`Record`] impl so the
//! mapping is declared once, next to the struct, and checked at compile
//! time for field names and Rust types.
//!
//! [`Record`]: crate::db::mapping::Record

/// Implement [`Record`](crate::db::mapping::Record) for a struct.
///
/// Each entry is `field: "column" => Kind`, optionally followed by flags in
/// brackets: `[nullable]`, `[generated]` or both.
///
/// # Example
///
/// ```ignore
/// impl_record! {
///     Author, table = "author", {
///         id: "id" => Int8 [generated],
///         name: "name" => Text,
///         bio: "bio" => Text [nullable],
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_record {
    (
        $ty:ty, table = $table:literal, {
            $( $field:ident : $column:literal => $kind:ident $( [ $($flag:ident),+ ] )? ),+ $(,)?
        }
    ) => {
        impl $crate::db::mapping::Record for $ty {
            const TABLE: &'static str = $table;
            const FIELDS: &'static [$crate::db::mapping::FieldSpec] = &[
                $(
                    $crate::db::mapping::FieldSpec::new(
                        stringify!($field),
                        $column,
                        $crate::db::types::ColumnKind::$kind,
                    ) $( $( .$flag() )+ )?
                ),+
            ];

            fn get(&self, field: &str) -> ::std::option::Option<$crate::models::QueryParam> {
                match field {
                    $(
                        stringify!($field) => ::std::option::Option::Some(
                            $crate::models::QueryParam::from(
                                ::std::clone::Clone::clone(&self.$field),
                            ),
                        ),
                    )+
                    _ => ::std::option::Option::None,
                }
            }

            fn set(
                &mut self,
                field: &str,
                value: $crate::models::QueryParam,
            ) -> ::std::result::Result<(), ::std::string::String> {
                match field {
                    $(
                        stringify!($field) => {
                            self.$field = $crate::models::FromParam::from_param(value)?;
                            ::std::result::Result::Ok(())
                        }
                    )+
                    other => ::std::result::Result::Err(::std::format!("unknown field '{}'", other)),
                }
            }
        }
    };
}

pub use impl_record;
