use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// Canonical identifier of a fantasy player.
///
/// Equal to the nfldb `player_id` for individual players (e.g. "00-0019596")
/// and to the nfldb `team_id` for team defense/special teams (e.g. "NE").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FantasyPlayerId(pub String);

impl FantasyPlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FantasyPlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FantasyPlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Fantasy positions (composite positions such as FLEX are not included)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FantasyPosition {
    QB,
    RB,
    WR,
    TE,
    K,
    DST,
    DL,
    LB,
    DB,
}

impl FantasyPosition {
    pub const ALL: [FantasyPosition; 9] = [
        FantasyPosition::QB,
        FantasyPosition::RB,
        FantasyPosition::WR,
        FantasyPosition::TE,
        FantasyPosition::K,
        FantasyPosition::DST,
        FantasyPosition::DL,
        FantasyPosition::LB,
        FantasyPosition::DB,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FantasyPosition::QB => "QB",
            FantasyPosition::RB => "RB",
            FantasyPosition::WR => "WR",
            FantasyPosition::TE => "TE",
            FantasyPosition::K => "K",
            FantasyPosition::DST => "DST",
            FantasyPosition::DL => "DL",
            FantasyPosition::LB => "LB",
            FantasyPosition::DB => "DB",
        }
    }

    /// Map a roster position (as scraped or as stored by nfldb) to its fantasy position
    pub fn from_player_position(pos: &str) -> Option<Self> {
        let pos = pos.trim().to_ascii_uppercase();
        let fantasy_pos = match pos.as_str() {
            "QB" => FantasyPosition::QB,
            "RB" | "FB" => FantasyPosition::RB,
            "WR" => FantasyPosition::WR,
            "TE" => FantasyPosition::TE,
            "K" | "PK" => FantasyPosition::K,
            "D" | "DEF" | "DST" | "D/ST" => FantasyPosition::DST,
            "DL" | "DE" | "DT" | "NT" => FantasyPosition::DL,
            "LB" | "MLB" | "ILB" | "OLB" => FantasyPosition::LB,
            "DB" | "CB" | "SAF" | "FS" | "SS" => FantasyPosition::DB,
            _ => return None,
        };
        Some(fantasy_pos)
    }
}

impl fmt::Display for FantasyPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FantasyPosition {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FantasyPosition::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                StoreError::invalid_value("fantasy_pos", format!("unknown position '{s}'"))
            })
    }
}

/// Period a projection set covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionScope {
    Week,
    Season,
    RestOfSeason,
}

impl ProjectionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectionScope::Week => "week",
            ProjectionScope::Season => "season",
            ProjectionScope::RestOfSeason => "rest_of_season",
        }
    }
}

impl fmt::Display for ProjectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectionScope {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(ProjectionScope::Week),
            "season" => Ok(ProjectionScope::Season),
            "rest_of_season" => Ok(ProjectionScope::RestOfSeason),
            other => Err(StoreError::invalid_value(
                "projection_scope",
                format!("unknown scope '{other}'"),
            )),
        }
    }
}

/// nfldb season phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SeasonType {
    Preseason,
    #[default]
    Regular,
    Postseason,
}

impl SeasonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeasonType::Preseason => "Preseason",
            SeasonType::Regular => "Regular",
            SeasonType::Postseason => "Postseason",
        }
    }
}

impl fmt::Display for SeasonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeasonType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preseason" => Ok(SeasonType::Preseason),
            "regular" => Ok(SeasonType::Regular),
            "postseason" => Ok(SeasonType::Postseason),
            other => Err(StoreError::invalid_value(
                "season_type",
                format!("unknown season type '{other}'"),
            )),
        }
    }
}

/// A scheduled game from the canonical statistics database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub gsis_id: String,
    pub season_year: i32,
    pub season_type: SeasonType,
    pub week: i32,
    pub home_team: String,
    pub away_team: String,
}

/// Lookup keys for a single game
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameQuery {
    pub season_year: i32,
    pub season_type: SeasonType,
    pub week: i32,
    pub home_team: String,
}

impl GameQuery {
    pub fn matches(&self, game: &Game) -> bool {
        game.season_year == self.season_year
            && game.season_type == self.season_type
            && game.week == self.week
            && game.home_team == self.home_team
    }
}

impl fmt::Display for GameQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "season_year={}, season_type={}, week={}, home_team={}",
            self.season_year, self.season_type, self.week, self.home_team
        )
    }
}

/// What kind of canonical entity a fantasy player id points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Team,
}

/// An entry of the fuzzy-search corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: FantasyPlayerId,
    pub kind: EntityKind,

    /// Name shown in candidate reports (e.g. "Tom Brady" or "New England Patriots")
    pub display_name: String,

    /// Strings the scraped name is compared against
    pub search_names: Vec<String>,

    pub team: Option<String>,
    pub position: Option<String>,
}

impl Candidate {
    pub fn player(
        player_id: impl Into<String>,
        full_name: impl Into<String>,
        team: Option<String>,
        position: Option<String>,
    ) -> Self {
        let full_name = full_name.into();
        Self {
            id: FantasyPlayerId(player_id.into()),
            kind: EntityKind::Player,
            display_name: full_name.clone(),
            search_names: vec![full_name],
            team,
            position,
        }
    }

    /// A team defense, searchable by abbreviation and by "City Nickname"
    pub fn team(team_id: impl Into<String>, city: &str, nickname: &str) -> Self {
        let team_id = team_id.into();
        let full_name = format!("{city} {nickname}");
        Self {
            id: FantasyPlayerId(team_id.clone()),
            kind: EntityKind::Team,
            display_name: full_name.clone(),
            search_names: vec![team_id.clone(), full_name],
            team: Some(team_id),
            position: Some(FantasyPosition::DST.as_str().to_string()),
        }
    }

    /// "Tom Brady (NE, QB)"
    pub fn label(&self) -> String {
        let team = self.team.as_deref().unwrap_or("?");
        let position = self.position.as_deref().unwrap_or("?");
        format!("{} ({}, {})", self.display_name, team, position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_mapping() {
        assert_eq!(FantasyPosition::from_player_position("DE"), Some(FantasyPosition::DL));
        assert_eq!(FantasyPosition::from_player_position("olb"), Some(FantasyPosition::LB));
        assert_eq!(FantasyPosition::from_player_position("SS"), Some(FantasyPosition::DB));
        assert_eq!(FantasyPosition::from_player_position("D"), Some(FantasyPosition::DST));
        assert_eq!(FantasyPosition::from_player_position("QB"), Some(FantasyPosition::QB));
        assert_eq!(FantasyPosition::from_player_position("OT"), None);
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("dst".parse::<FantasyPosition>().unwrap(), FantasyPosition::DST);
        assert_eq!(
            "Rest_Of_Season".parse::<ProjectionScope>().unwrap(),
            ProjectionScope::RestOfSeason
        );
        assert_eq!("regular".parse::<SeasonType>().unwrap(), SeasonType::Regular);
        assert!("playoffs".parse::<SeasonType>().is_err());
    }

    #[test]
    fn test_team_candidate_names() {
        let patriots = Candidate::team("NE", "New England", "Patriots");
        assert_eq!(
            patriots.search_names,
            vec!["NE".to_string(), "New England Patriots".to_string()]
        );
        assert_eq!(patriots.label(), "New England Patriots (NE, DST)");
    }
}
