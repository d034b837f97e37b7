//! Application configuration.
//!
//! Everything the engine treats as injected data lives here: the session
//! parameters, the team roster, the per-round market tables, and the broker
//! routing rules. The defaults describe a complete five-round session so the
//! binary runs without a config file; `config/Config.toml` and
//! `MOCKSTOCK_`-prefixed environment variables override them.

use crate::types::Role;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub roster: Vec<RosterEntry>,
    pub market: MarketConfig,
    pub brokers: BrokerRoutingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Session-wide settlement parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Highest round an admin may activate; round 0 is the system-purchase
    /// phase, peer-to-peer flows run in 1..=max_round.
    pub max_round: u32,
    /// Cash every seeded team starts with.
    pub starting_capital: Decimal,
    /// Short exposure cap as a multiple of the team's cash at open time.
    pub leverage_cap: Decimal,
    /// Fraction of contract notional an option seller must hold as margin.
    pub margin_rate: Decimal,
    /// Whether a rejected option trade refunds the buyer's premium.
    pub refund_premium_on_reject: bool,
}

/// One seeded participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub team: String,
    pub access_code: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    pub instruments: Vec<InstrumentConfig>,
    pub rounds: Vec<RoundPricesConfig>,
    pub chains: Vec<OptionChainConfig>,
}

/// An instrument row in the market table. Index and commodity rows are
/// display-only and never settle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub ticker: String,
    #[serde(default = "default_tradable")]
    pub tradable: bool,
}

const fn default_tradable() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundPricesConfig {
    pub round: u32,
    pub prices: Vec<QuoteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteConfig {
    pub ticker: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionChainConfig {
    pub round: u32,
    pub strikes: Vec<StrikeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrikeConfig {
    pub strike: Decimal,
    pub call_premium: Decimal,
    pub put_premium: Decimal,
}

/// Broker routing data: per-team overrides first, then round sheets, then
/// the fallback broker. Reassignment is a config change, not a code change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerRoutingConfig {
    #[serde(default)]
    pub teams: Vec<TeamRouteConfig>,
    #[serde(default)]
    pub sheets: Vec<SheetRouteConfig>,
    pub fallback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRouteConfig {
    pub team: String,
    pub broker: String,
}

/// A verification sheet covering a contiguous range of rounds, worked by one
/// or more brokers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetRouteConfig {
    pub name: String,
    pub first_round: u32,
    pub last_round: u32,
    pub brokers: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            session: SessionConfig {
                max_round: 4,
                starting_capital: dec!(10_000_000),
                leverage_cap: dec!(3),
                margin_rate: dec!(0.20),
                refund_premium_on_reject: true,
            },
            roster: default_roster(),
            market: default_market(),
            brokers: BrokerRoutingConfig {
                teams: Vec::new(),
                sheets: vec![
                    SheetRouteConfig {
                        name: "R4".to_string(),
                        first_round: 1,
                        last_round: 2,
                        brokers: vec!["broker_01".to_string(), "broker_02".to_string()],
                    },
                    SheetRouteConfig {
                        name: "R5".to_string(),
                        first_round: 3,
                        last_round: 4,
                        brokers: vec!["broker_03".to_string()],
                    },
                ],
                fallback: "broker_01".to_string(),
            },
        }
    }
}

fn default_roster() -> Vec<RosterEntry> {
    let users = [
        ("team_alpha", "1111"),
        ("team_beta", "2222"),
        ("team_gamma", "3333"),
        ("team_delta", "4444"),
        ("team_echo", "5555"),
    ];
    let brokers = [
        ("broker_01", "7001"),
        ("broker_02", "7002"),
        ("broker_03", "7003"),
    ];

    let mut roster: Vec<RosterEntry> = users
        .iter()
        .map(|(team, code)| RosterEntry {
            team: (*team).to_string(),
            access_code: (*code).to_string(),
            role: Role::User,
        })
        .collect();
    roster.extend(brokers.iter().map(|(team, code)| RosterEntry {
        team: (*team).to_string(),
        access_code: (*code).to_string(),
        role: Role::Broker,
    }));
    roster.push(RosterEntry {
        team: "admin".to_string(),
        access_code: "9999".to_string(),
        role: Role::Admin,
    });
    roster
}

fn default_market() -> MarketConfig {
    // Base quotes drift round over round; index/commodity rows are quoted
    // for display but never settle.
    let base: [(&str, Decimal, bool); 8] = [
        ("RELIANCE", dec!(2500), true),
        ("TCS", dec!(3800), true),
        ("HDFCBANK", dec!(1550), true),
        ("INFY", dec!(1450), true),
        ("TATAMOTORS", dec!(650), true),
        ("INDEX", dec!(22000), false),
        ("GOLD", dec!(62000), false),
        ("COPPER", dec!(720), false),
    ];
    let drifts: [Decimal; 5] = [dec!(1), dec!(1.04), dec!(0.97), dec!(1.09), dec!(1.02)];

    let instruments = base
        .iter()
        .map(|(ticker, _, tradable)| InstrumentConfig {
            ticker: (*ticker).to_string(),
            tradable: *tradable,
        })
        .collect();

    let rounds = drifts
        .iter()
        .enumerate()
        .map(|(round, drift)| RoundPricesConfig {
            round: round as u32,
            prices: base
                .iter()
                .map(|(ticker, price, _)| QuoteConfig {
                    ticker: (*ticker).to_string(),
                    price: (price * drift).round_dp(2),
                })
                .collect(),
        })
        .collect();

    // Index option chains for the peer-to-peer rounds.
    let strikes: [Decimal; 5] = [
        dec!(21000),
        dec!(21500),
        dec!(22000),
        dec!(22500),
        dec!(23000),
    ];
    let chains = (1..=4u32)
        .map(|round| {
            let drift = drifts[round as usize];
            let spot = (dec!(22000) * drift).round_dp(2);
            OptionChainConfig {
                round,
                strikes: strikes
                    .iter()
                    .map(|strike| StrikeConfig {
                        strike: *strike,
                        call_premium: premium_for(spot - strike),
                        put_premium: premium_for(strike - spot),
                    })
                    .collect(),
            }
        })
        .collect();

    MarketConfig {
        instruments,
        rounds,
        chains,
    }
}

/// Scaled intrinsic value plus a flat time component.
fn premium_for(intrinsic: Decimal) -> Decimal {
    let time_value = dec!(120);
    if intrinsic > Decimal::ZERO {
        (intrinsic / dec!(10) + time_value).round_dp(2)
    } else {
        time_value
    }
}
