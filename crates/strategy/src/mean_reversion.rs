use serde::{Deserialize, Serialize};
use tracing::warn;

use common::{
    Direction, Error, PositionState, PriceObservation, Result, RsiParameters, Signal,
    StrategyParameters,
};

use crate::indicators::{RollingWindow, RsiIndicator};

/// Closed set of strategy variants, selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    MeanReversion,
    MeanReversionRsi,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::MeanReversion => write!(f, "mean_reversion"),
            StrategyKind::MeanReversionRsi => write!(f, "mean_reversion_rsi"),
        }
    }
}

/// Rolling z-score and position shared by both variants.
#[derive(Debug, Clone)]
struct ZScoreState {
    params: StrategyParameters,
    window: RollingWindow,
    position: PositionState,
    last_z: Option<f64>,
}

impl ZScoreState {
    fn new(params: StrategyParameters) -> Self {
        Self {
            window: RollingWindow::new(params.lookback_period),
            params,
            position: PositionState::Flat,
            last_z: None,
        }
    }

    /// Push the price into the window and return the z-score of that price.
    fn update(&mut self, price: f64) -> Option<f64> {
        self.window.push(price);
        self.last_z = self.window.z_score(price);
        self.last_z
    }

    /// Exit when z crosses back through zero against the open position.
    fn exit_on_cross(&mut self, z: f64) -> Signal {
        let crossed = match self.position {
            PositionState::Flat => false,
            PositionState::Long(_) => z >= 0.0,
            PositionState::Short(_) => z <= 0.0,
        };
        if crossed {
            self.position = PositionState::Flat;
            Signal::Exit
        } else {
            Signal::Hold
        }
    }

    /// Direction the plain rule asks for, if the threshold is breached.
    fn breach(&self, z: f64) -> Option<Direction> {
        if z > self.params.deviation_threshold {
            Some(Direction::Short)
        } else if z < -self.params.deviation_threshold {
            Some(Direction::Long)
        } else {
            None
        }
    }

    fn enter(&mut self, direction: Direction, size: u64) -> Signal {
        self.position = PositionState::open(direction, size);
        Signal::Enter { direction, size }
    }
}

/// Plain z-score mean reversion: fade moves beyond `deviation_threshold`
/// standard deviations with a fixed stake.
#[derive(Debug, Clone)]
pub struct PlainMeanReversion {
    state: ZScoreState,
}

impl PlainMeanReversion {
    fn observe(&mut self, price: f64) -> Signal {
        let Some(z) = self.state.update(price) else {
            return Signal::Hold;
        };
        if !self.state.position.is_flat() {
            return self.state.exit_on_cross(z);
        }
        match self.state.breach(z) {
            Some(direction) => self.state.enter(direction, self.state.params.stake),
            None => Signal::Hold,
        }
    }
}

/// Mean reversion gated by RSI momentum confirmation, with the stake
/// scaled by `max(1, |z|)`.
#[derive(Debug, Clone)]
pub struct RsiEnhancedMeanReversion {
    state: ZScoreState,
    rsi: RsiIndicator,
    bounds: RsiParameters,
}

impl RsiEnhancedMeanReversion {
    fn observe(&mut self, price: f64) -> Signal {
        let rsi = self.rsi.update(price);
        let Some(z) = self.state.update(price) else {
            return Signal::Hold;
        };
        if !self.state.position.is_flat() {
            return self.state.exit_on_cross(z);
        }

        let Some(rsi) = rsi else {
            return Signal::Hold;
        };
        let confirmed = match self.state.breach(z) {
            Some(Direction::Long) if rsi < self.bounds.lower => Some(Direction::Long),
            Some(Direction::Short) if rsi > self.bounds.upper => Some(Direction::Short),
            _ => None,
        };
        match confirmed {
            Some(direction) => {
                let size = scaled_stake(self.state.params.stake, z);
                self.state.enter(direction, size)
            }
            None => Signal::Hold,
        }
    }
}

/// `floor(stake * max(1, |z|))`; never below `stake`.
fn scaled_stake(stake: u64, z: f64) -> u64 {
    let scaled = (stake as f64 * z.abs().max(1.0)).floor() as u64;
    scaled.max(stake)
}

/// The decision function shared by the simulator and the live adapter.
///
/// Owns its rolling statistics and position; knows nothing about cash or
/// fills. At most one action per observation.
#[derive(Debug, Clone)]
pub enum StrategyCore {
    Plain(PlainMeanReversion),
    RsiEnhanced(RsiEnhancedMeanReversion),
}

impl StrategyCore {
    /// Build the variant implied by `params`: RSI-enhanced when RSI settings are present.
    pub fn new(params: StrategyParameters) -> Result<Self> {
        params.validate()?;
        let state = ZScoreState::new(params);
        Ok(match params.rsi {
            None => StrategyCore::Plain(PlainMeanReversion { state }),
            Some(bounds) => StrategyCore::RsiEnhanced(RsiEnhancedMeanReversion {
                state,
                rsi: RsiIndicator::new(bounds.period),
                bounds,
            }),
        })
    }

    /// Build a specific variant, checking that `params` carries what it needs.
    pub fn with_kind(kind: StrategyKind, mut params: StrategyParameters) -> Result<Self> {
        match kind {
            StrategyKind::MeanReversion => params.rsi = None,
            StrategyKind::MeanReversionRsi if params.rsi.is_none() => {
                return Err(Error::InvalidParameters(
                    "mean_reversion_rsi requires rsi_period, rsi_lower and rsi_upper".into(),
                ))
            }
            StrategyKind::MeanReversionRsi => {}
        }
        Self::new(params)
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyCore::Plain(_) => StrategyKind::MeanReversion,
            StrategyCore::RsiEnhanced(_) => StrategyKind::MeanReversionRsi,
        }
    }

    fn state(&self) -> &ZScoreState {
        match self {
            StrategyCore::Plain(s) => &s.state,
            StrategyCore::RsiEnhanced(s) => &s.state,
        }
    }

    pub fn parameters(&self) -> &StrategyParameters {
        &self.state().params
    }

    pub fn position(&self) -> PositionState {
        self.state().position
    }

    /// z-score of the most recent observation, if it was defined.
    pub fn last_z_score(&self) -> Option<f64> {
        self.state().last_z
    }

    /// Consume one observation and decide.
    ///
    /// Non-finite prices are ignored and yield `Hold`.
    pub fn observe<O: PriceObservation>(&mut self, observation: &O) -> Signal {
        let price = observation.price();
        if !price.is_finite() {
            warn!(price, "Ignoring non-finite price observation");
            return Signal::Hold;
        }
        match self {
            StrategyCore::Plain(s) => s.observe(price),
            StrategyCore::RsiEnhanced(s) => s.observe(price),
        }
    }

    /// Update the indicators without deciding. Used to seed from history.
    pub fn prime(&mut self, price: f64) {
        if !price.is_finite() {
            return;
        }
        match self {
            StrategyCore::Plain(s) => {
                s.state.update(price);
            }
            StrategyCore::RsiEnhanced(s) => {
                s.rsi.update(price);
                s.state.update(price);
            }
        }
    }
}
