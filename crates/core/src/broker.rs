//! Broker routing for the option verification queue.
//!
//! Assignment is a pure lookup over injected data: a per-team override
//! table, then round sheets, then the configured fallback. Every matched
//! trade lands in exactly one broker's queue; admins see the union.

use crate::config::BrokerRoutingConfig;
use crate::types::normalize_team;

/// Where a matched option trade goes for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub broker: String,
    /// Sheet label when the assignment came from a round sheet.
    pub sheet: Option<String>,
}

#[derive(Debug, Clone)]
struct SheetRoute {
    name: String,
    first_round: u32,
    last_round: u32,
    brokers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BrokerAssignment {
    teams: Vec<(String, String)>,
    sheets: Vec<SheetRoute>,
    fallback: String,
}

impl BrokerAssignment {
    #[must_use]
    pub fn from_config(config: &BrokerRoutingConfig) -> Self {
        let teams = config
            .teams
            .iter()
            .map(|rule| (normalize_team(&rule.team), normalize_team(&rule.broker)))
            .collect();
        let sheets = config
            .sheets
            .iter()
            .map(|sheet| SheetRoute {
                name: sheet.name.clone(),
                first_round: sheet.first_round,
                last_round: sheet.last_round,
                brokers: sheet.brokers.iter().map(|b| normalize_team(b)).collect(),
            })
            .collect();

        Self {
            teams,
            sheets,
            fallback: normalize_team(&config.fallback),
        }
    }

    /// Resolves the broker for a trade by the selling team and the round it
    /// matched in. First matching team rule wins, then the round sheet
    /// (spread deterministically across the sheet's brokers by team name),
    /// then the fallback.
    #[must_use]
    pub fn assign(&self, team: &str, round: u32) -> Assignment {
        let team = normalize_team(team);

        if let Some((_, broker)) = self.teams.iter().find(|(t, _)| *t == team) {
            return Assignment {
                broker: broker.clone(),
                sheet: None,
            };
        }

        for sheet in &self.sheets {
            if sheet.first_round <= round && round <= sheet.last_round && !sheet.brokers.is_empty()
            {
                let idx = team.bytes().map(usize::from).sum::<usize>() % sheet.brokers.len();
                return Assignment {
                    broker: sheet.brokers[idx].clone(),
                    sheet: Some(sheet.name.clone()),
                };
            }
        }

        Assignment {
            broker: self.fallback.clone(),
            sheet: None,
        }
    }
}
