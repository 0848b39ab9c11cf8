//! Static description of every table owned by the projection schema.
//!
//! Column lists, types, keys and the field→fact-table classification are
//! declared here once and shared by the PostgreSQL store, the in-memory store
//! and the loader, so no decision depends on querying live schema metadata.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{Result, StoreError};
use crate::value::{Row, Value};

/// A PostgreSQL enum type and its labels
#[derive(Debug, PartialEq, Eq)]
pub struct EnumType {
    pub name: &'static str,
    pub variants: &'static [&'static str],
}

pub static FANTASY_POSITION_TYPE: EnumType = EnumType {
    name: "fantasy_position",
    variants: &["QB", "RB", "WR", "TE", "K", "DST", "DL", "LB", "DB"],
};

pub static PROJ_SCOPE_TYPE: EnumType =
    EnumType { name: "proj_scope", variants: &["week", "season", "rest_of_season"] };

/// Defined by nfldb, reused here
pub static SEASON_PHASE_TYPE: EnumType =
    EnumType { name: "season_phase", variants: &["Preseason", "Regular", "Postseason"] };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Boolean,
    Timestamp,
    Enum(&'static EnumType),
}

impl ColumnType {
    /// Type a bound parameter is cast to when written
    pub fn sql_cast(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Real => "real",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamptz",
            ColumnType::Enum(e) => e.name,
        }
    }

    /// Type a column is cast to when read back
    pub fn read_cast(&self) -> &'static str {
        match self {
            ColumnType::Text | ColumnType::Enum(_) => "text",
            ColumnType::Integer => "integer",
            ColumnType::Real => "double precision",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamptz",
        }
    }

    /// Convert `value` to the representation stored in a column of this type.
    ///
    /// `Null` passes through unchanged; nullability is checked by the stores.
    pub fn coerce(&self, column: &str, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let mismatch = || {
            let message = format!("cannot store '{value}' as {}", self.sql_cast());
            StoreError::invalid_value(column, message)
        };

        match self {
            ColumnType::Text => Ok(match value {
                Value::Text(s) => Value::Text(s.clone()),
                Value::Timestamp(ts) => Value::Text(ts.to_rfc3339()),
                other => Value::Text(other.to_string()),
            }),
            ColumnType::Integer => value.as_i64().map(Value::Int).ok_or_else(mismatch),
            ColumnType::Real => value.as_f64().map(Value::Float).ok_or_else(mismatch),
            ColumnType::Boolean => value.as_bool().map(Value::Bool).ok_or_else(mismatch),
            ColumnType::Timestamp => match value {
                Value::Timestamp(ts) => Ok(Value::Timestamp(*ts)),
                Value::Text(s) => parse_timestamp(s).map(Value::Timestamp).ok_or_else(mismatch),
                _ => Err(mismatch()),
            },
            ColumnType::Enum(enum_type) => {
                let label = value.as_str().ok_or_else(mismatch)?;
                enum_type
                    .variants
                    .iter()
                    .find(|variant| variant.eq_ignore_ascii_case(label.trim()))
                    .map(|variant| Value::Text((*variant).to_string()))
                    .ok_or_else(|| {
                        StoreError::invalid_value(
                            column,
                            format!(
                                "'{label}' is not a {} (expected one of {})",
                                enum_type.name,
                                enum_type.variants.join(", ")
                            ),
                        )
                    })
            }
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Value a column takes when an insert leaves it out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    None,
    Serial,
    Now,
    Bool(bool),
    Text(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: ColumnDefault,
}

impl ColumnDef {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self { name, ty, nullable: false, default: ColumnDefault::None }
    }

    pub const fn nullable(self) -> Self {
        Self { nullable: true, ..self }
    }

    pub const fn with_default(self, default: ColumnDefault) -> Self {
        Self { default, ..self }
    }

    /// Non-null without a default: every insert must supply it
    pub fn is_required(&self) -> bool {
        !self.nullable && self.default == ColumnDefault::None
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ForeignKey {
    pub columns: &'static [&'static str],
    pub references: &'static str,
    pub referenced_columns: &'static [&'static str],
}

#[derive(Debug, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    pub primary_key: &'static [&'static str],
    pub foreign_keys: &'static [ForeignKey],

    /// Dataset fields whose presence selects this table as a load destination
    pub payload: &'static [&'static str],

    /// Rows may not reference the unscored `None` point system
    pub scored: bool,
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&'static ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> {
        self.columns.iter().map(|c| c.name)
    }

    pub fn required_columns(&self) -> impl Iterator<Item = &'static ColumnDef> {
        self.columns.iter().filter(|c| c.is_required())
    }

    /// Keep the entries of `row` that are columns of this table, coerced to the
    /// column types, in declaration order. Null entries are left out so the
    /// column default applies.
    pub fn prepare_row(&self, row: &Row) -> Result<Vec<(&'static ColumnDef, Value)>> {
        let mut prepared = Vec::new();
        for column in self.columns {
            let Some(value) = row.get(column.name) else { continue };
            let value = column.ty.coerce(column.name, value)?;
            if !value.is_null() {
                prepared.push((column, value));
            }
        }
        Ok(prepared)
    }

    /// Coerce every entry of a lookup key, rejecting names that are not columns
    pub fn coerce_key(&self, key: &Row) -> Result<Row> {
        key.iter()
            .map(|(name, value)| {
                let column = self.column(name).ok_or_else(|| {
                    let message = format!("not a column of {}", self.name);
                    StoreError::invalid_value(name.clone(), message)
                })?;
                Ok((name.clone(), column.ty.coerce(name, value)?))
            })
            .collect()
    }

    /// Values of `columns` in `row`, or `None` if any of them is missing
    pub fn key_values(row: &Row, columns: &[&str]) -> Option<Vec<Value>> {
        columns
            .iter()
            .map(|c| row.get(*c).filter(|v| !v.is_null()).cloned())
            .collect()
    }
}

use ColumnDefault as D;
use ColumnType::{Boolean, Enum, Integer, Real, Text, Timestamp};

/// The `fpsys_name` of raw-statistic projections
pub const UNSCORED_SYSTEM: &str = "None";

pub static FANTASY_PLAYER: TableDef = TableDef {
    name: "fantasy_player",
    columns: &[
        ColumnDef::new("fantasy_player_id", Text),
        ColumnDef::new("player_id", Text).nullable(),
        ColumnDef::new("team_id", Text).nullable(),
    ],
    primary_key: &["fantasy_player_id"],
    foreign_keys: &[],
    payload: &[],
    scored: false,
};

pub static NAME_DISAMBIGUATION: TableDef = TableDef {
    name: "name_disambiguation",
    columns: &[
        ColumnDef::new("name_as_scraped", Text),
        ColumnDef::new("fantasy_player_id", Text),
    ],
    primary_key: &["name_as_scraped"],
    foreign_keys: &[ForeignKey {
        columns: &["fantasy_player_id"],
        references: "fantasy_player",
        referenced_columns: &["fantasy_player_id"],
    }],
    payload: &[],
    scored: false,
};

pub static PROJECTION_SOURCE: TableDef = TableDef {
    name: "projection_source",
    columns: &[
        ColumnDef::new("source_name", Text),
        ColumnDef::new("source_url", Text).nullable(),
        ColumnDef::new("source_notes", Text).nullable(),
    ],
    primary_key: &["source_name"],
    foreign_keys: &[],
    payload: &[],
    scored: false,
};

pub static FP_SYSTEM: TableDef = TableDef {
    name: "fp_system",
    columns: &[
        ColumnDef::new("fpsys_name", Text),
        ColumnDef::new("fpsys_url", Text).nullable(),
    ],
    primary_key: &["fpsys_name"],
    foreign_keys: &[],
    payload: &[],
    scored: false,
};

pub static DFS_SITE: TableDef = TableDef {
    name: "dfs_site",
    columns: &[
        ColumnDef::new("fpsys_name", Text),
        ColumnDef::new("dfs_name", Text),
        ColumnDef::new("dfs_url", Text).nullable(),
    ],
    primary_key: &["fpsys_name", "dfs_name"],
    foreign_keys: &[ForeignKey {
        columns: &["fpsys_name"],
        references: "fp_system",
        referenced_columns: &["fpsys_name"],
    }],
    payload: &[],
    scored: true,
};

pub static PROJECTION_SET: TableDef = TableDef {
    name: "projection_set",
    columns: &[
        ColumnDef::new("source_name", Text),
        ColumnDef::new("fpsys_name", Text),
        ColumnDef::new("set_id", Integer).with_default(D::Serial),
        ColumnDef::new("projection_scope", Enum(&PROJ_SCOPE_TYPE)),
        ColumnDef::new("season_year", Integer),
        ColumnDef::new("season_type", Enum(&SEASON_PHASE_TYPE)).with_default(D::Text("Regular")),
        ColumnDef::new("week", Integer).nullable(),
        ColumnDef::new("date_accessed", Timestamp).with_default(D::Now),
        ColumnDef::new("known_incomplete", Boolean).with_default(D::Bool(false)),
    ],
    primary_key: &["source_name", "fpsys_name", "set_id"],
    foreign_keys: &[
        ForeignKey {
            columns: &["source_name"],
            references: "projection_source",
            referenced_columns: &["source_name"],
        },
        ForeignKey {
            columns: &["fpsys_name"],
            references: "fp_system",
            referenced_columns: &["fpsys_name"],
        },
    ],
    payload: &[],
    scored: false,
};

const SET_FOREIGN_KEYS: &[ForeignKey] = &[
    ForeignKey {
        columns: &["source_name", "fpsys_name", "set_id"],
        references: "projection_set",
        referenced_columns: &["source_name", "fpsys_name", "set_id"],
    },
    ForeignKey {
        columns: &["fantasy_player_id"],
        references: "fantasy_player",
        referenced_columns: &["fantasy_player_id"],
    },
];

const SET_PRIMARY_KEY: &[&str] = &["source_name", "fpsys_name", "set_id", "fantasy_player_id"];

macro_rules! stat_projection_table {
    ($($stat:ident),* $(,)?) => {
        /// Raw statistic columns of `stat_projection`, named as in nfldb
        pub const STAT_FIELDS: &[&str] = &[$(stringify!($stat)),*];

        pub static STAT_PROJECTION: TableDef = TableDef {
            name: "stat_projection",
            columns: &[
                ColumnDef::new("source_name", Text),
                ColumnDef::new("fpsys_name", Text),
                ColumnDef::new("set_id", Integer),
                ColumnDef::new("fantasy_player_id", Text),
                ColumnDef::new("gsis_id", Text).nullable(),
                ColumnDef::new("team", Text),
                ColumnDef::new("fantasy_pos", Enum(&FANTASY_POSITION_TYPE)),
                $(ColumnDef::new(stringify!($stat), Real).nullable()),*
            ],
            primary_key: SET_PRIMARY_KEY,
            foreign_keys: SET_FOREIGN_KEYS,
            payload: STAT_FIELDS,
            scored: false,
        };
    };
}

stat_projection_table!(
    passing_att,
    passing_cmp,
    passing_yds,
    passing_tds,
    passing_int,
    passing_twoptm,
    rushing_att,
    rushing_yds,
    rushing_tds,
    rushing_twoptm,
    receiving_tar,
    receiving_rec,
    receiving_yds,
    receiving_tds,
    receiving_twoptm,
    fumbles_lost,
    kickret_tds,
    puntret_tds,
    kicking_fga,
    kicking_fgm,
    kicking_fgmissed,
    kicking_xpa,
    kicking_xpmade,
    kicking_xpmissed,
    defense_sk,
    defense_int,
    defense_frec,
    defense_ffum,
    defense_safe,
    defense_tds,
    defense_int_tds,
    defense_frec_tds,
    defense_pts_allowed,
    defense_yds_allowed,
);

pub static FP_PROJECTION: TableDef = TableDef {
    name: "fp_projection",
    columns: &[
        ColumnDef::new("source_name", Text),
        ColumnDef::new("fpsys_name", Text),
        ColumnDef::new("set_id", Integer),
        ColumnDef::new("fantasy_player_id", Text),
        ColumnDef::new("gsis_id", Text).nullable(),
        ColumnDef::new("team", Text),
        ColumnDef::new("fantasy_pos", Enum(&FANTASY_POSITION_TYPE)),
        ColumnDef::new("projected_fp", Real),
        ColumnDef::new("fp_variance", Real).nullable(),
    ],
    primary_key: SET_PRIMARY_KEY,
    foreign_keys: SET_FOREIGN_KEYS,
    payload: &["projected_fp", "fp_variance"],
    scored: true,
};

pub static FP_SCORE: TableDef = TableDef {
    name: "fp_score",
    columns: &[
        ColumnDef::new("source_name", Text),
        ColumnDef::new("fpsys_name", Text),
        ColumnDef::new("set_id", Integer),
        ColumnDef::new("fantasy_player_id", Text),
        ColumnDef::new("gsis_id", Text).nullable(),
        ColumnDef::new("team", Text),
        ColumnDef::new("fantasy_pos", Enum(&FANTASY_POSITION_TYPE)),
        ColumnDef::new("actual_fp", Real),
    ],
    primary_key: SET_PRIMARY_KEY,
    foreign_keys: SET_FOREIGN_KEYS,
    payload: &["actual_fp"],
    scored: true,
};

pub static DFS_SALARY: TableDef = TableDef {
    name: "dfs_salary",
    columns: &[
        ColumnDef::new("fpsys_name", Text),
        ColumnDef::new("dfs_name", Text),
        ColumnDef::new("fantasy_player_id", Text),
        ColumnDef::new("season_year", Integer),
        ColumnDef::new("season_type", Enum(&SEASON_PHASE_TYPE)).with_default(D::Text("Regular")),
        ColumnDef::new("week", Integer),
        ColumnDef::new("gsis_id", Text).nullable(),
        ColumnDef::new("team", Text),
        ColumnDef::new("fantasy_pos", Enum(&FANTASY_POSITION_TYPE)),
        ColumnDef::new("salary", Integer),
    ],
    primary_key: &[
        "fpsys_name",
        "dfs_name",
        "fantasy_player_id",
        "season_year",
        "season_type",
        "week",
    ],
    foreign_keys: &[
        ForeignKey {
            columns: &["fpsys_name", "dfs_name"],
            references: "dfs_site",
            referenced_columns: &["fpsys_name", "dfs_name"],
        },
        ForeignKey {
            columns: &["fantasy_player_id"],
            references: "fantasy_player",
            referenced_columns: &["fantasy_player_id"],
        },
    ],
    payload: &["salary"],
    scored: true,
};

/// Every table owned by the projection schema, parents before children.
/// Locks are always taken in this order.
pub static SYSTEM_TABLES: &[&TableDef] = &[
    &FANTASY_PLAYER,
    &NAME_DISAMBIGUATION,
    &PROJECTION_SOURCE,
    &FP_SYSTEM,
    &DFS_SITE,
    &PROJECTION_SET,
    &STAT_PROJECTION,
    &FP_PROJECTION,
    &FP_SCORE,
    &DFS_SALARY,
];

/// Destination tables of a data load
pub static FACT_TABLES: &[&TableDef] = &[&STAT_PROJECTION, &FP_PROJECTION, &FP_SCORE, &DFS_SALARY];

/// Input columns that steer preprocessing but are not stored as-is
pub const CONTROL_COLUMNS: &[&str] =
    &["name", "team", "pos", "fantasy_pos", "week", "opp", "home", "gsis_id", "fantasy_player_id"];

pub fn table(name: &str) -> Option<&'static TableDef> {
    SYSTEM_TABLES.iter().copied().find(|t| t.name == name)
}

/// Whether an input column is a control column or a field of some fact table
pub fn is_recognized_column(column: &str) -> bool {
    CONTROL_COLUMNS.contains(&column) || FACT_TABLES.iter().any(|t| t.has_column(column))
}

/// Fact tables selected by a set of dataset columns.
///
/// A table is selected as soon as any one of its payload fields is present.
pub fn fact_tables_for_columns<'a, I>(columns: I) -> Vec<&'static TableDef>
where
    I: IntoIterator<Item = &'a str>,
{
    let columns: Vec<&str> = columns.into_iter().collect();
    FACT_TABLES
        .iter()
        .copied()
        .filter(|t| t.payload.iter().any(|field| columns.contains(field)))
        .collect()
}
