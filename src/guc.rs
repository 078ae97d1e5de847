//LICENSE Portions Copyright 2019-2021 ZomboDB, LLC.
//LICENSE
//LICENSE Portions Copyright 2021-2023 Technology Concepts & Design, Inc.
//LICENSE
//LICENSE Portions Copyright 2023-2023 PgCentral Foundation, Inc. <contact@pgcentral.org>
//LICENSE
//LICENSE All rights reserved.
//LICENSE
//LICENSE Use of this source code is governed by the MIT license that can be found in the LICENSE file.
//! `budget_trigger.*` settings
use std::ffi::CStr;

use pgrx::guc::*;
use pgrx::prelude::*;

/// What `set_budget` does when the target column isn't in the table
#[derive(PostgresGucEnum, Clone, Copy, PartialEq, Eq, Debug)]
pub enum MissingColumn {
    /// Abort the statement
    Error,
    /// Suppress the row, so the INSERT or UPDATE doesn't happen for it
    Skip,
}

static DEFAULT_COLUMN: GucSetting<Option<&'static CStr>> =
    GucSetting::<Option<&'static CStr>>::new(Some(c"budget_id"));
static DEFAULT_VALUE: GucSetting<i32> = GucSetting::<i32>::new(0);
static MISSING_COLUMN: GucSetting<MissingColumn> =
    GucSetting::<MissingColumn>::new(MissingColumn::Error);

pub fn init() {
    GucRegistry::define_string_guc(
        "budget_trigger.default_column",
        "Column set_budget() overwrites when the trigger passes no arguments",
        "Name of the integer column, as stored in the catalog, that set_budget() forces to \
         budget_trigger.default_value on every INSERT and UPDATE.",
        &DEFAULT_COLUMN,
        GucContext::Userset,
        GucFlags::default(),
    );
    GucRegistry::define_int_guc(
        "budget_trigger.default_value",
        "Value set_budget() writes when the trigger passes no value argument",
        "Value set_budget() writes when the trigger passes no value argument.",
        &DEFAULT_VALUE,
        i32::MIN,
        i32::MAX,
        GucContext::Userset,
        GucFlags::default(),
    );
    GucRegistry::define_enum_guc(
        "budget_trigger.missing_column",
        "What set_budget() does when the target column doesn't exist",
        "'error' aborts the statement. 'skip' silently drops the row being inserted or updated.",
        &MISSING_COLUMN,
        GucContext::Userset,
        GucFlags::default(),
    );
}

pub fn default_column() -> Option<String> {
    DEFAULT_COLUMN.get().map(|column| column.to_string_lossy().into_owned())
}

pub fn default_value() -> i64 {
    i64::from(DEFAULT_VALUE.get())
}

pub fn missing_column() -> MissingColumn {
    MISSING_COLUMN.get()
}
