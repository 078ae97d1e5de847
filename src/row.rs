//LICENSE Portions Copyright 2019-2021 ZomboDB, LLC.
//LICENSE
//LICENSE Portions Copyright 2021-2023 Technology Concepts & Design, Inc.
//LICENSE
//LICENSE Portions Copyright 2023-2023 PgCentral Foundation, Inc. <contact@pgcentral.org>
//LICENSE
//LICENSE All rights reserved.
//LICENSE
//LICENSE Use of this source code is governed by the MIT license that can be found in the LICENSE file.
//! Column resolution and construction of the replacement row
use std::ffi::CStr;
use std::fmt;
use std::num::NonZeroUsize;

use pgrx::datum::TryFromDatumError;
use pgrx::pg_sys::{self, PgBuiltInOids, PgOid};
use pgrx::prelude::*;
use pgrx::{AllocatedByPostgres, AllocatedByRust, PgMemoryContexts, PgRelation};

use crate::error::BudgetTriggerError;

/// Integer column types a replacement value can be written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerWidth {
    Int2,
    Int4,
    Int8,
}

impl IntegerWidth {
    fn from_type_oid(oid: PgOid) -> Option<Self> {
        match oid {
            PgOid::BuiltIn(PgBuiltInOids::INT2OID) => Some(IntegerWidth::Int2),
            PgOid::BuiltIn(PgBuiltInOids::INT4OID) => Some(IntegerWidth::Int4),
            PgOid::BuiltIn(PgBuiltInOids::INT8OID) => Some(IntegerWidth::Int8),
            _ => None,
        }
    }

    /// Narrow `value` to this width, `None` if it doesn't fit.
    pub fn narrow(self, value: i64) -> Option<IntegerValue> {
        match self {
            IntegerWidth::Int2 => i16::try_from(value).ok().map(IntegerValue::Int2),
            IntegerWidth::Int4 => i32::try_from(value).ok().map(IntegerValue::Int4),
            IntegerWidth::Int8 => Some(IntegerValue::Int8(value)),
        }
    }
}

impl fmt::Display for IntegerWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IntegerWidth::Int2 => "smallint",
            IntegerWidth::Int4 => "integer",
            IntegerWidth::Int8 => "bigint",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerValue {
    Int2(i16),
    Int4(i32),
    Int8(i64),
}

impl IntegerValue {
    fn store(
        self,
        row: &mut PgHeapTuple<'_, AllocatedByRust>,
        attno: NonZeroUsize,
    ) -> Result<(), TryFromDatumError> {
        match self {
            IntegerValue::Int2(v) => row.set_by_index(attno, v),
            IntegerValue::Int4(v) => row.set_by_index(attno, v),
            IntegerValue::Int8(v) => row.set_by_index(attno, v),
        }
    }
}

impl fmt::Display for IntegerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegerValue::Int2(v) => write!(f, "{v}"),
            IntegerValue::Int4(v) => write!(f, "{v}"),
            IntegerValue::Int8(v) => write!(f, "{v}"),
        }
    }
}

/// A column resolved against the relation's live tuple descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetColumn {
    /// 1-based, counting dropped attributes
    pub attno: NonZeroUsize,
    pub width: IntegerWidth,
}

/// Find `column` among the relation's live (non-dropped) attributes.
///
/// Returns `Ok(None)` when no such column exists; what to do about it is up to the caller.
pub fn resolve_column(
    relation: &PgRelation,
    column: &str,
) -> Result<Option<TargetColumn>, BudgetTriggerError> {
    let tupdesc = relation.tuple_desc();
    let found = tupdesc
        .iter()
        .enumerate()
        .find(|(_, att)| !att.is_dropped() && att.name() == column);

    let Some((index, att)) = found else {
        return Ok(None);
    };

    let width = IntegerWidth::from_type_oid(att.type_oid()).ok_or_else(|| {
        BudgetTriggerError::UnsupportedColumnType {
            column: column.to_string(),
            type_name: type_name(att.atttypid),
        }
    })?;

    // `index` counts from zero, attribute numbers from one
    let attno = NonZeroUsize::new(index + 1).expect("attribute numbers start at 1");
    Ok(Some(TargetColumn { attno, width }))
}

fn type_name(oid: pg_sys::Oid) -> String {
    // SAFETY: format_type_be() handles any oid, including unknown ones, and
    // returns a palloc'd, NUL-terminated string
    unsafe { CStr::from_ptr(pg_sys::format_type_be(oid)) }.to_string_lossy().into_owned()
}

/// Copy `base` with the target attribute set to `value`.
///
/// The copy is made while holding an SPI session, which is closed again on every exit
/// path. SPI switches into its own memory context, so the copy is explicitly allocated in
/// the caller's context: it must outlive the session, since Postgres stores it after we
/// return.
pub fn rewrite<'a>(
    base: PgHeapTuple<'a, AllocatedByPostgres>,
    target: TargetColumn,
    value: IntegerValue,
) -> Result<PgHeapTuple<'a, AllocatedByRust>, BudgetTriggerError> {
    let mut caller_context = PgMemoryContexts::For(PgMemoryContexts::CurrentMemoryContext.value());

    Spi::connect(move |_session| {
        // SAFETY: the caller's context is the executor's per-tuple context of the current
        // trigger invocation, which stays valid until after Postgres has consumed the row
        unsafe {
            caller_context.switch_to(move |_| {
                let mut row = base.into_owned();
                value.store(&mut row, target.attno)?;
                Ok::<_, BudgetTriggerError>(row)
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrows_to_column_width() {
        assert_eq!(IntegerWidth::Int2.narrow(0), Some(IntegerValue::Int2(0)));
        assert_eq!(IntegerWidth::Int2.narrow(-32768), Some(IntegerValue::Int2(i16::MIN)));
        assert_eq!(IntegerWidth::Int2.narrow(32768), None);

        assert_eq!(IntegerWidth::Int4.narrow(42), Some(IntegerValue::Int4(42)));
        assert_eq!(IntegerWidth::Int4.narrow(i64::from(i32::MAX) + 1), None);

        assert_eq!(IntegerWidth::Int8.narrow(i64::MIN), Some(IntegerValue::Int8(i64::MIN)));
    }

    #[test]
    fn width_names_match_sql() {
        assert_eq!(IntegerWidth::Int2.to_string(), "smallint");
        assert_eq!(IntegerWidth::Int4.to_string(), "integer");
        assert_eq!(IntegerWidth::Int8.to_string(), "bigint");
    }
}
