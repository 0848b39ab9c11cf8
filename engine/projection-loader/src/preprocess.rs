//! Row preparation ahead of a load: positions, byes, game ids, DST names and
//! fantasy player ids

use std::collections::HashMap;

use projection_store::{Database, FantasyPosition, GameQuery, SeasonType, Value};
use tracing::{debug, info};

use crate::dataset::Dataset;
use crate::error::{LoaderError, Result};
use crate::metadata::Metadata;
use crate::names::NameResolver;

/// Fill `fantasy_pos` from the roster position in `pos` when only `pos` is supplied
pub fn derive_fantasy_pos(data: &mut Dataset) -> Result<()> {
    if data.has_column("fantasy_pos") || !data.has_column("pos") {
        return Ok(());
    }

    for row in data.rows_mut() {
        let fantasy_pos = match row.get("pos") {
            None | Some(Value::Null) => Value::Null,
            Some(pos) => {
                let raw = pos.to_string();
                let mapped = FantasyPosition::from_player_position(&raw).ok_or_else(|| {
                    LoaderError::invalid_value("pos", format!("no fantasy position for '{raw}'"))
                })?;
                Value::from(mapped.as_str())
            }
        };
        row.insert("fantasy_pos".to_string(), fantasy_pos);
    }
    data.ensure_column("fantasy_pos");
    Ok(())
}

/// Remove bye-week rows (`opp` null or "-"); returns how many were removed
pub fn drop_byes(data: &mut Dataset) -> usize {
    if !data.has_column("opp") {
        return 0;
    }
    let dropped = data.retain(|row| match row.get("opp") {
        None | Some(Value::Null) => false,
        Some(opp) => opp.as_str().map_or(true, |s| s.trim() != "-"),
    });
    if dropped > 0 {
        debug!("Dropped {} bye rows", dropped);
    }
    dropped
}

fn required_text(row: &projection_store::Row, column: &str) -> Result<String> {
    match row.get(column) {
        None | Some(Value::Null) => {
            Err(LoaderError::MissingValue { column: column.to_string(), rows: 1 })
        }
        Some(value) => Ok(value.to_string()),
    }
}

fn row_week(row: &projection_store::Row, metadata: &Metadata) -> Result<i64> {
    let value = match row.get("week").filter(|v| !v.is_null()) {
        Some(week) => week,
        None => metadata
            .get("week")
            .filter(|v| !v.is_null())
            .ok_or_else(|| LoaderError::MissingValue { column: "week".to_string(), rows: 1 })?,
    };
    value.as_i64().ok_or_else(|| {
        LoaderError::invalid_value("week", format!("'{value}' is not a week number"))
    })
}

/// Season year and phase of the games a dataset refers to
fn season_of(metadata: &Metadata) -> Result<(i32, SeasonType)> {
    let year = metadata
        .get("season_year")
        .filter(|v| !v.is_null())
        .ok_or_else(|| LoaderError::missing_metadata("game", "season_year"))?;
    let year = year
        .as_i64()
        .and_then(|y| i32::try_from(y).ok())
        .ok_or_else(|| {
            LoaderError::invalid_value("season_year", format!("'{year}' is not a year"))
        })?;

    let season_type = match metadata.get("season_type") {
        None | Some(Value::Null) => SeasonType::default(),
        Some(value) => value.to_string().parse()?,
    };
    Ok((year, season_type))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GameKey {
    week: i64,
    team: String,
    home: bool,
    opp: String,
}

/// Set `gsis_id` on every row by looking up the game each row's team plays.
///
/// Rows are grouped by (week, team, home, opp) so each game is queried once.
pub async fn assign_game_ids<S>(data: &mut Dataset, store: &S, metadata: &Metadata) -> Result<()>
where
    S: Database + ?Sized,
{
    if data.has_column("gsis_id") {
        return Ok(());
    }
    for column in ["team", "home", "opp"] {
        if !data.has_column(column) {
            return Err(LoaderError::MissingColumn {
                column: column.to_string(),
                purpose: "look up games",
            });
        }
    }
    let (season_year, season_type) = season_of(metadata)?;

    let mut keys = Vec::with_capacity(data.len());
    for row in data.rows() {
        let home = row.get("home").cloned().unwrap_or_default();
        let home = home.as_bool().ok_or_else(|| {
            LoaderError::invalid_value("home", format!("'{home}' is not a home/away flag"))
        })?;
        keys.push(GameKey {
            week: row_week(row, metadata)?,
            team: required_text(row, "team")?,
            home,
            opp: required_text(row, "opp")?,
        });
    }

    let mut games: HashMap<GameKey, String> = HashMap::new();
    for key in &keys {
        if games.contains_key(key) {
            continue;
        }
        let week = i32::try_from(key.week).map_err(|_| {
            LoaderError::invalid_value("week", format!("{} is out of range", key.week))
        })?;
        let query = GameQuery {
            season_year,
            season_type,
            week,
            home_team: if key.home { key.team.clone() } else { key.opp.clone() },
        };

        let found = store.find_games(&query).await?;
        let gsis_id = match found.as_slice() {
            [game] => game.gsis_id.clone(),
            [] => {
                return Err(LoaderError::NoGameMatch {
                    query,
                    team: key.team.clone(),
                    opp: key.opp.clone(),
                });
            }
            several => {
                return Err(LoaderError::AmbiguousGameMatch {
                    query,
                    team: key.team.clone(),
                    opp: key.opp.clone(),
                    gsis_ids: several.iter().map(|g| g.gsis_id.clone()).collect(),
                });
            }
        };
        games.insert(key.clone(), gsis_id);
    }

    for (row, key) in data.rows_mut().iter_mut().zip(&keys) {
        let gsis_id = games.get(key).cloned().map(Value::Text).unwrap_or_default();
        row.insert("gsis_id".to_string(), gsis_id);
    }
    data.ensure_column("gsis_id");
    info!("Assigned {} game ids to {} rows", games.len(), keys.len());
    Ok(())
}

/// Team defenses are named by their team abbreviation
pub fn fix_dst_names(data: &mut Dataset) {
    if !data.has_column("fantasy_pos") || !data.has_column("team") {
        return;
    }
    for row in data.rows_mut() {
        let is_dst = row
            .get("fantasy_pos")
            .and_then(Value::as_str)
            .is_some_and(|pos| pos.eq_ignore_ascii_case(FantasyPosition::DST.as_str()));
        if is_dst {
            let team = row.get("team").cloned().unwrap_or_default();
            row.insert("name".to_string(), team);
        }
    }
    data.ensure_column("name");
}

/// Set `fantasy_player_id` on every row, resolving each distinct name once
pub async fn assign_player_ids<S>(data: &mut Dataset, resolver: &NameResolver<'_, S>) -> Result<()>
where
    S: Database + ?Sized,
{
    if data.has_column("fantasy_player_id") {
        return Ok(());
    }
    if !data.has_column("name") {
        return Err(LoaderError::MissingColumn {
            column: "name".to_string(),
            purpose: "resolve fantasy player ids",
        });
    }

    let unnamed = data.rows().iter().filter(|r| r.get("name").map_or(true, Value::is_null)).count();
    if unnamed > 0 {
        return Err(LoaderError::MissingValue { column: "name".to_string(), rows: unnamed });
    }

    let mut ids: HashMap<String, Value> = HashMap::new();
    for name in data.distinct("name") {
        let name = name.to_string();
        let id = resolver.resolve(&name).await?;
        ids.insert(name, Value::from(id.as_str()));
    }

    for row in data.rows_mut() {
        let name = row.get("name").map(ToString::to_string).unwrap_or_default();
        let id = ids.get(&name).cloned().unwrap_or_default();
        row.insert("fantasy_player_id".to_string(), id);
    }
    data.ensure_column("fantasy_player_id");
    debug!("Resolved {} distinct names", ids.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use projection_store::{row, Candidate, Game, MemoryStore};

    fn game(gsis_id: &str, week: i32, home: &str, away: &str) -> Game {
        Game {
            gsis_id: gsis_id.to_string(),
            season_year: 2015,
            season_type: SeasonType::Regular,
            week,
            home_team: home.to_string(),
            away_team: away.to_string(),
        }
    }

    fn metadata() -> Metadata {
        row([("season_year", Value::Int(2015))])
    }

    /// One team's view of a week 1 game
    fn side(team: &str, home: Value, opp: &str) -> projection_store::Row {
        row([
            ("team", Value::from(team)),
            ("home", home),
            ("opp", Value::from(opp)),
            ("week", Value::Int(1)),
        ])
    }

    #[test]
    fn test_derive_fantasy_pos() {
        let mut data = Dataset::from_rows(vec![
            row([("pos", Value::from("DE"))]),
            row([("pos", Value::from("qb"))]),
            row([("pos", Value::Null)]),
        ]);
        derive_fantasy_pos(&mut data).unwrap();
        assert_eq!(data.value(0, "fantasy_pos"), &Value::from("DL"));
        assert_eq!(data.value(1, "fantasy_pos"), &Value::from("QB"));
        assert!(data.value(2, "fantasy_pos").is_null());

        let mut bad = Dataset::from_rows(vec![row([("pos", Value::from("OT"))])]);
        assert!(matches!(derive_fantasy_pos(&mut bad), Err(LoaderError::InvalidValue { .. })));
    }

    #[test]
    fn test_drop_byes() {
        let mut data = Dataset::from_rows(vec![
            row([("name", Value::from("Tom Brady")), ("opp", Value::from("PIT"))]),
            row([("name", Value::from("Tony Romo")), ("opp", Value::from("-"))]),
            row([("name", Value::from("Eli Manning")), ("opp", Value::Null)]),
        ]);
        assert_eq!(drop_byes(&mut data), 2);
        assert_eq!(data.len(), 1);
        assert_eq!(data.value(0, "name"), &Value::from("Tom Brady"));
    }

    #[test]
    fn test_fix_dst_names() {
        let mut data = Dataset::from_rows(vec![
            row([
                ("name", Value::from("Patriots D/ST")),
                ("team", Value::from("NE")),
                ("fantasy_pos", Value::from("DST")),
            ]),
            row([
                ("name", Value::from("Tom Brady")),
                ("team", Value::from("NE")),
                ("fantasy_pos", Value::from("QB")),
            ]),
        ]);
        fix_dst_names(&mut data);
        assert_eq!(data.value(0, "name"), &Value::from("NE"));
        assert_eq!(data.value(1, "name"), &Value::from("Tom Brady"));
    }

    #[tokio::test]
    async fn test_assign_game_ids_queries_home_team() {
        let store = MemoryStore::new(
            Vec::new(),
            vec![game("2015091000", 1, "NE", "PIT"), game("2015091300", 1, "NYJ", "CLE")],
        );
        let mut data = Dataset::from_rows(vec![
            side("NE", Value::Bool(true), "PIT"),
            side("PIT", Value::from("away"), "NE"),
            side("CLE", Value::from("@"), "NYJ"),
        ]);
        assign_game_ids(&mut data, &store, &metadata()).await.unwrap();
        assert_eq!(data.value(0, "gsis_id"), &Value::from("2015091000"));
        assert_eq!(data.value(1, "gsis_id"), &Value::from("2015091000"));
        assert_eq!(data.value(2, "gsis_id"), &Value::from("2015091300"));
    }

    #[tokio::test]
    async fn test_assign_game_ids_errors_name_the_game() {
        let store = MemoryStore::new(
            Vec::new(),
            vec![game("2015091000", 1, "NE", "PIT"), game("2015091001", 1, "NE", "PIT")],
        );
        let mut ambiguous = Dataset::from_rows(vec![row([
            ("team", Value::from("NE")),
            ("home", Value::Bool(true)),
            ("opp", Value::from("PIT")),
            ("week", Value::Int(1)),
        ])]);
        match assign_game_ids(&mut ambiguous, &store, &metadata()).await {
            Err(LoaderError::AmbiguousGameMatch { gsis_ids, team, .. }) => {
                assert_eq!(gsis_ids.len(), 2);
                assert_eq!(team, "NE");
            }
            other => panic!("expected AmbiguousGameMatch, got {other:?}"),
        }

        let mut unknown = Dataset::from_rows(vec![row([
            ("team", Value::from("DAL")),
            ("home", Value::Bool(true)),
            ("opp", Value::from("NYG")),
            ("week", Value::Int(1)),
        ])]);
        match assign_game_ids(&mut unknown, &store, &metadata()).await {
            Err(LoaderError::NoGameMatch { query, opp, .. }) => {
                assert_eq!(query.home_team, "DAL");
                assert_eq!(query.season_type, SeasonType::Regular);
                assert_eq!(opp, "NYG");
            }
            other => panic!("expected NoGameMatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_week_falls_back_to_metadata() {
        let store = MemoryStore::new(Vec::new(), vec![game("2015092700", 3, "NE", "JAC")]);
        let mut data = Dataset::from_rows(vec![row([
            ("team", Value::from("JAC")),
            ("home", Value::Bool(false)),
            ("opp", Value::from("NE")),
        ])]);
        let metadata = row([("season_year", Value::Int(2015)), ("week", Value::Int(3))]);
        assign_game_ids(&mut data, &store, &metadata).await.unwrap();
        assert_eq!(data.value(0, "gsis_id"), &Value::from("2015092700"));
    }

    #[tokio::test]
    async fn test_assign_player_ids_requires_names() {
        let store = MemoryStore::new(
            vec![Candidate::player(
                "00-0019596",
                "Tom Brady",
                Some("NE".into()),
                Some("QB".into()),
            )],
            Vec::new(),
        );
        let resolver = NameResolver::new(&store);

        let mut data = Dataset::from_rows(vec![
            row([("name", Value::from("Tom Brady"))]),
            row([("name", Value::from("Tom Brady"))]),
        ]);
        assign_player_ids(&mut data, &resolver).await.unwrap();
        assert_eq!(data.value(1, "fantasy_player_id"), &Value::from("00-0019596"));

        let mut unnamed = Dataset::from_rows(vec![row([("team", Value::from("NE"))])]);
        assert!(matches!(
            assign_player_ids(&mut unnamed, &resolver).await,
            Err(LoaderError::MissingColumn { .. })
        ));
    }
}
