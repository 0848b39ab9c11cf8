//! End-to-end loads against the in-memory store

use std::collections::BTreeMap;

use projection_store::catalog::{
    DFS_SALARY, DFS_SITE, FP_PROJECTION, FP_SCORE, FP_SYSTEM, PROJECTION_SET, PROJECTION_SOURCE,
    STAT_PROJECTION, SYSTEM_TABLES,
};
use projection_store::{
    row, Candidate, FantasyPlayerId, Game, MemoryStore, ProjectionStore, Row, SeasonType, Value,
};

use crate::dataset::Dataset;
use crate::error::LoaderError;
use crate::loader::{Category, LoadOptions, Loader};
use crate::metadata::Metadata;
use crate::names::{add_disambiguations, NameResolver};

const BRADY: &str = "00-0019596";
const GRONKOWSKI: &str = "00-0027656";
const ROETHLISBERGER: &str = "00-0022924";
const BROWN: &str = "00-0027793";

fn corpus() -> Vec<Candidate> {
    vec![
        Candidate::player(BRADY, "Tom Brady", Some("NE".into()), Some("QB".into())),
        Candidate::player(GRONKOWSKI, "Rob Gronkowski", Some("NE".into()), Some("TE".into())),
        Candidate::player(
            ROETHLISBERGER,
            "Ben Roethlisberger",
            Some("PIT".into()),
            Some("QB".into()),
        ),
        Candidate::player(BROWN, "Antonio Brown", Some("PIT".into()), Some("WR".into())),
        Candidate::team("NE", "New England", "Patriots"),
        Candidate::team("PIT", "Pittsburgh", "Steelers"),
    ]
}

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

fn store() -> MemoryStore {
    MemoryStore::new(
        corpus(),
        vec![
            game("2015091000", 1, "NE", "PIT"),
            game("2015092000", 2, "BUF", "NE"),
            game("2015092001", 2, "PIT", "SF"),
        ],
    )
}

fn metadata(fpsys_name: &str) -> Metadata {
    row([
        ("fpsys_name", Value::from(fpsys_name)),
        ("source_name", Value::from("numberFire")),
        ("source_url", Value::from("https://www.numberfire.com")),
        ("projection_scope", Value::from("week")),
        ("season_year", Value::Int(2015)),
    ])
}

/// Name, team and position as a site lists them
type Who = (&'static str, &'static str, &'static str);
/// Week, opponent and whether the team plays at home
type Side = (i64, &'static str, bool);

const TOM_BRADY: Who = ("Tom Brady", "NE", "QB");
const ROB_GRONKOWSKI: Who = ("Rob Gronkowski", "NE", "TE");
const BEN_ROETHLISBERGER: Who = ("Ben Roethlisberger", "PIT", "QB");
const ANTONIO_BROWN: Who = ("Antonio Brown", "PIT", "WR");
const NE_WEEK_ONE: Side = (1, "PIT", true);
const PIT_WEEK_ONE: Side = (1, "NE", false);

fn scraped((name, team, pos): Who, (week, opp, home): Side, fields: &[(&str, Value)]) -> Row {
    let mut scraped = row([
        ("name", Value::from(name)),
        ("team", Value::from(team)),
        ("pos", Value::from(pos)),
        ("week", Value::Int(week)),
        ("opp", Value::from(opp)),
        ("home", Value::Bool(home)),
    ]);
    for (column, value) in fields {
        scraped.insert(column.to_string(), value.clone());
    }
    scraped
}

fn week_one_stats() -> Vec<Row> {
    vec![
        scraped(
            TOM_BRADY,
            NE_WEEK_ONE,
            &[("passing_yds", Value::Float(288.5)), ("passing_tds", Value::Float(2.1))],
        ),
        scraped(ROB_GRONKOWSKI, NE_WEEK_ONE, &[("receiving_yds", Value::Float(81.0))]),
        scraped(BEN_ROETHLISBERGER, PIT_WEEK_ONE, &[("passing_yds", Value::Float(301.2))]),
        scraped(ANTONIO_BROWN, PIT_WEEK_ONE, &[("receiving_rec", Value::Float(7.4))]),
    ]
}

fn single_week() -> LoadOptions {
    LoadOptions { single_week_only: true, ..LoadOptions::default() }
}

#[cfg(test)]
#[allow(clippy::module_inception)]
mod integration_tests {
    use super::*;

    #[tokio::test]
    async fn test_single_week_stat_load() {
        let store = store();
        let loader = Loader::new(&store);

        let report = loader
            .load(Dataset::from_rows(week_one_stats()), &metadata("NFL.com"), &single_week())
            .await
            .unwrap();

        let stats = store.rows(&STAT_PROJECTION).await.unwrap();
        assert_eq!(stats.len(), 4);
        let set_id = &stats[0]["set_id"];
        assert!(stats.iter().all(|r| &r["set_id"] == set_id));
        assert!(stats.iter().all(|r| r["fpsys_name"] == Value::from("None")));
        assert!(stats.iter().all(|r| r["gsis_id"] == Value::from("2015091000")));
        assert_eq!(store.row_count(&FP_PROJECTION), 0);

        let brady = stats.iter().find(|r| r["fantasy_player_id"] == Value::from(BRADY)).unwrap();
        assert_eq!(brady["passing_yds"], Value::Float(288.5));
        assert_eq!(brady["fantasy_pos"], Value::from("QB"));
        assert!(brady["rushing_yds"].is_null());

        let sets = store.rows(&PROJECTION_SET).await.unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0]["fpsys_name"], Value::from("None"));
        assert_eq!(sets[0]["week"], Value::Int(1));

        assert_eq!(report.rows_inserted(), 4);
        assert_eq!(report.category(Category::StatProjection).unwrap().sets.len(), 1);
        assert!(report.category(Category::FpProjection).unwrap().sets.is_empty());
        // Statistic loads never register the scoring system they were scraped with.
        assert_eq!(store.row_count(&FP_SYSTEM), 1);
    }

    #[tokio::test]
    async fn test_bye_rows_are_dropped_silently() {
        let store = store();
        let mut rows = week_one_stats();
        rows.push(scraped(
            ("Nobody Special", "DAL", "QB"),
            (1, "-", false),
            &[("passing_yds", Value::Float(0.0))],
        ));
        let mut bye = scraped(
            ("Someone Else", "DAL", "WR"),
            (1, "-", false),
            &[("receiving_yds", Value::Float(1.0))],
        );
        bye.insert("opp".to_string(), Value::Null);
        rows.push(bye);

        let report = Loader::new(&store)
            .load(Dataset::from_rows(rows), &metadata("NFL.com"), &single_week())
            .await
            .unwrap();

        assert_eq!(report.byes_dropped, 2);
        assert_eq!(store.row_count(&STAT_PROJECTION), 4);
    }

    #[tokio::test]
    async fn test_null_salary_drops_only_that_salary_row() {
        let store = store();
        let rows = vec![
            scraped(
                TOM_BRADY,
                NE_WEEK_ONE,
                &[("salary", Value::Int(7900)), ("passing_yds", Value::Float(288.5))],
            ),
            scraped(
                ROB_GRONKOWSKI,
                NE_WEEK_ONE,
                &[("salary", Value::Null), ("receiving_yds", Value::Float(81.0))],
            ),
            scraped(
                ANTONIO_BROWN,
                PIT_WEEK_ONE,
                &[("salary", Value::Int(8600)), ("receiving_rec", Value::Float(7.4))],
            ),
        ];
        let mut metadata = metadata("DraftKings");
        metadata.insert("dfs_name".to_string(), Value::from("DraftKings"));
        metadata.insert("dfs_url".to_string(), Value::from("https://www.draftkings.com"));
        let options =
            LoadOptions { fp_projection: false, dfs_salary: true, ..LoadOptions::default() };

        let report =
            Loader::new(&store).load(Dataset::from_rows(rows), &metadata, &options).await.unwrap();

        let salaries = store.rows(&DFS_SALARY).await.unwrap();
        assert_eq!(salaries.len(), 2);
        assert!(salaries.iter().all(|r| r["fantasy_player_id"] != Value::from(GRONKOWSKI)));
        assert!(salaries.iter().all(|r| r["season_type"] == Value::from("Regular")));
        assert!(salaries.iter().all(|r| r["week"] == Value::Int(1)));
        assert_eq!(report.category(Category::DfsSalary).unwrap().rows_dropped, 1);
        assert_eq!(store.row_count(&DFS_SITE), 1);

        // The statistic load keeps the row whose salary was missing.
        let stats = store.rows(&STAT_PROJECTION).await.unwrap();
        assert_eq!(stats.len(), 3);
        assert!(stats.iter().any(|r| r["fantasy_player_id"] == Value::from(GRONKOWSKI)));
        assert_eq!(report.category(Category::StatProjection).unwrap().rows_dropped, 0);
    }

    #[tokio::test]
    async fn test_null_actual_points_drop_only_that_score_row() {
        let store = store();
        let rows = vec![
            scraped(TOM_BRADY, NE_WEEK_ONE, &[("actual_fp", Value::Float(26.4))]),
            scraped(ANTONIO_BROWN, PIT_WEEK_ONE, &[("actual_fp", Value::Null)]),
        ];
        let options = LoadOptions {
            fp_projection: false,
            stat_projection: false,
            fp_score: true,
            ..LoadOptions::default()
        };

        let report = Loader::new(&store)
            .load(Dataset::from_rows(rows), &metadata("NFL.com"), &options)
            .await
            .unwrap();

        let scores = store.rows(&FP_SCORE).await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0]["fantasy_player_id"], Value::from(BRADY));
        assert_eq!(scores[0]["actual_fp"], Value::Float(26.4));
        assert_eq!(scores[0]["fpsys_name"], Value::from("NFL.com"));

        let category = report.category(Category::FpScore).unwrap();
        assert_eq!(category.rows_dropped, 1);
        assert_eq!(category.rows_inserted(), 1);
        assert_eq!(store.row_count(&PROJECTION_SET), 1);
    }

    #[tokio::test]
    async fn test_integral_float_week_shares_a_set() {
        let store = store();
        let mut gronkowski = scraped(
            ROB_GRONKOWSKI,
            NE_WEEK_ONE,
            &[("projected_fp", Value::Float(14.2))],
        );
        gronkowski.insert("week".to_string(), Value::Float(1.0));
        let rows = vec![
            scraped(TOM_BRADY, NE_WEEK_ONE, &[("projected_fp", Value::Float(21.3))]),
            gronkowski,
        ];

        for options in [LoadOptions::default(), single_week()] {
            let report = Loader::new(&store)
                .load(Dataset::from_rows(rows.clone()), &metadata("NFL.com"), &options)
                .await
                .unwrap();

            let sets = &report.category(Category::FpProjection).unwrap().sets;
            assert_eq!(sets.len(), 1);
            assert_eq!((sets[0].week, sets[0].rows), (Some(1), 2));
        }
    }

    #[tokio::test]
    async fn test_unrecognized_column_fails_before_any_write() {
        let store = store();
        let mut rows = week_one_stats();
        rows[0].insert("rush_yards".to_string(), Value::Float(2.0));

        let err = Loader::new(&store)
            .load(Dataset::from_rows(rows), &metadata("NFL.com"), &single_week())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LoaderError::UnrecognizedColumn { ref columns } if columns == &["rush_yards"]
        ));
        assert!(store.lock_history().is_empty());
        assert_eq!(store.row_count(&PROJECTION_SOURCE), 0);
        assert_eq!(store.row_count(&STAT_PROJECTION), 0);
    }

    #[tokio::test]
    async fn test_disambiguation_beats_more_similar_entity() {
        let store = store();
        let mut mapping = BTreeMap::new();
        mapping.insert("Tom Brady".to_string(), FantasyPlayerId::from(ROETHLISBERGER));
        add_disambiguations(&store, &mapping).await.unwrap();

        let resolver = NameResolver::new(&store);
        assert_eq!(
            resolver.resolve("Tom Brady").await.unwrap(),
            FantasyPlayerId::from(ROETHLISBERGER)
        );
    }

    #[tokio::test]
    async fn test_unmatched_name_reports_limited_ranked_candidates() {
        let store = store();
        let resolver = NameResolver::new(&store);

        for limit in [1, 3, 10] {
            let err = resolver.resolve_with_limit("Tommy Bardy", limit).await.unwrap_err();
            let LoaderError::UnresolvedName { candidates, .. } = err else {
                panic!("expected UnresolvedName")
            };
            assert_eq!(candidates.len(), limit.min(corpus().len()));
            assert!(candidates.windows(2).all(|pair| pair[0].distance <= pair[1].distance));
            assert_eq!(candidates[0].candidate.id, FantasyPlayerId::from(BRADY));
        }
    }

    #[tokio::test]
    async fn test_unresolved_name_aborts_load() {
        let store = store();
        let mut rows = week_one_stats();
        rows[1].insert("name".to_string(), Value::from("Robert Gronkowsky"));

        let err = Loader::new(&store)
            .load(Dataset::from_rows(rows), &metadata("NFL.com"), &single_week())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoaderError::UnresolvedName { ref name, .. } if name == "Robert Gronkowsky"
        ));
        assert_eq!(store.row_count(&PROJECTION_SET), 0);
    }

    #[tokio::test]
    async fn test_repeated_loads_create_distinct_sets_and_shared_metadata() {
        let store = store();
        let loader = Loader::new(&store);
        let rows = vec![
            scraped(TOM_BRADY, NE_WEEK_ONE, &[("projected_fp", Value::Float(21.3))]),
            scraped(ANTONIO_BROWN, PIT_WEEK_ONE, &[("projected_fp", Value::Float(18.0))]),
        ];

        let first = loader
            .load(Dataset::from_rows(rows.clone()), &metadata("NFL.com"), &LoadOptions::default())
            .await
            .unwrap();
        let second = loader
            .load(Dataset::from_rows(rows), &metadata("NFL.com"), &LoadOptions::default())
            .await
            .unwrap();

        assert_eq!(first.set_ids().len(), 1);
        assert_eq!(second.set_ids().len(), 1);
        assert_ne!(first.set_ids(), second.set_ids());
        assert_eq!(store.row_count(&FP_PROJECTION), 4);
        assert_eq!(store.row_count(&PROJECTION_SOURCE), 1);
        assert_eq!(store.row_count(&FP_SYSTEM), 2);
    }

    #[tokio::test]
    async fn test_each_week_gets_its_own_set() {
        let store = store();
        let rows = vec![
            scraped(
                TOM_BRADY,
                NE_WEEK_ONE,
                &[("projected_fp", Value::Float(21.3)), ("passing_yds", Value::Float(280.0))],
            ),
            scraped(
                TOM_BRADY,
                (2, "BUF", false),
                &[("projected_fp", Value::Float(19.8)), ("passing_yds", Value::Float(265.0))],
            ),
            scraped(ANTONIO_BROWN, (2, "SF", true), &[("projected_fp", Value::Float(17.1))]),
        ];

        let report = Loader::new(&store)
            .load(Dataset::from_rows(rows), &metadata("NFL.com"), &LoadOptions::default())
            .await
            .unwrap();

        let fp = report.category(Category::FpProjection).unwrap();
        let sets: Vec<_> = fp.sets.iter().map(|s| (s.week, s.rows)).collect();
        assert_eq!(sets, vec![(Some(1), 1), (Some(2), 2)]);
        let stats = report.category(Category::StatProjection).unwrap();
        assert_eq!(stats.sets.len(), 2);
        assert_eq!(stats.rows_dropped, 1);
        assert_eq!(report.set_ids().len(), 4);
        assert_eq!(store.row_count(&PROJECTION_SET), 4);

        let week_two: Vec<_> = store
            .rows(&FP_PROJECTION)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r["gsis_id"] != Value::from("2015091000"))
            .collect();
        assert_eq!(week_two.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_partition_rolls_back() {
        let store = store();
        let rows = vec![
            scraped(TOM_BRADY, NE_WEEK_ONE, &[("projected_fp", Value::Float(21.3))]),
            scraped(TOM_BRADY, NE_WEEK_ONE, &[("projected_fp", Value::Float(20.0))]),
        ];
        let options = LoadOptions { stat_projection: false, ..LoadOptions::default() };

        let err = Loader::new(&store)
            .load(Dataset::from_rows(rows), &metadata("NFL.com"), &options)
            .await
            .unwrap_err();

        assert!(matches!(err, LoaderError::Store(ref e) if e.is_constraint_violation()));
        assert_eq!(store.row_count(&PROJECTION_SET), 0);
        assert_eq!(store.row_count(&PROJECTION_SOURCE), 0);
        assert_eq!(store.row_count(&FP_PROJECTION), 0);
    }

    #[tokio::test]
    async fn test_scored_categories_refuse_unscored_system() {
        let store = store();
        let rows = vec![scraped(TOM_BRADY, NE_WEEK_ONE, &[("projected_fp", Value::Float(21.3))])];

        let err = Loader::new(&store)
            .load(Dataset::from_rows(rows), &metadata("None"), &LoadOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, LoaderError::UnscoredSystem { table: "fp_projection" }));
        assert!(store.lock_history().is_empty());
    }

    #[tokio::test]
    async fn test_dst_rows_resolve_to_their_team() {
        let store = store();
        let rows = vec![scraped(
            ("Patriots D/ST", "NE", "D/ST"),
            NE_WEEK_ONE,
            &[("defense_sk", Value::Float(2.5)), ("projected_fp", Value::Float(9.0))],
        )];

        Loader::new(&store)
            .load(Dataset::from_rows(rows), &metadata("NFL.com"), &LoadOptions::default())
            .await
            .unwrap();

        let fp = store.rows(&FP_PROJECTION).await.unwrap();
        assert_eq!(fp[0]["fantasy_player_id"], Value::from("NE"));
        assert_eq!(fp[0]["fantasy_pos"], Value::from("DST"));
        let stats = store.rows(&STAT_PROJECTION).await.unwrap();
        assert_eq!(stats[0]["defense_sk"], Value::Float(2.5));
    }

    #[tokio::test]
    async fn test_missing_game_fails_before_writes() {
        let store = store();
        let rows = vec![scraped(
            TOM_BRADY,
            (3, "JAC", true),
            &[("projected_fp", Value::Float(25.0))],
        )];

        let err = Loader::new(&store)
            .load(Dataset::from_rows(rows), &metadata("NFL.com"), &LoadOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, LoaderError::NoGameMatch { ref team, .. } if team == "NE"));
        assert!(store.lock_history().is_empty());
    }

    #[tokio::test]
    async fn test_season_totals_are_a_no_op() {
        let store = store();
        let rows = vec![row([
            ("name", Value::from("Tom Brady")),
            ("team", Value::from("NE")),
            ("pos", Value::from("QB")),
            ("projected_fp", Value::Float(310.0)),
        ])];
        let mut metadata = metadata("NFL.com");
        metadata.insert("projection_scope".to_string(), Value::from("season"));
        let options = LoadOptions { season_totals: true, ..LoadOptions::default() };

        let report =
            Loader::new(&store).load(Dataset::from_rows(rows), &metadata, &options).await.unwrap();

        assert!(report.set_ids().is_empty());
        assert!(store.lock_history().is_empty());
    }

    #[tokio::test]
    async fn test_loads_lock_every_system_table() {
        let store = store();
        Loader::new(&store)
            .load(Dataset::from_rows(week_one_stats()), &metadata("NFL.com"), &single_week())
            .await
            .unwrap();

        let expected: Vec<&str> = SYSTEM_TABLES.iter().map(|t| t.name).collect();
        assert_eq!(store.lock_history(), vec![expected]);
    }
}
