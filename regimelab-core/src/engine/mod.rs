//! Backtest engine: the position state machine and the bar loop around it.

pub mod position;
pub mod simulator;

pub use position::{OpenPosition, PositionState, RegimeGate, StepInput, Transition, TransitionRules};
pub use simulator::{
    simulate, simulation_start, BarSignal, SimulationConfig, SimulationError, SimulationResult,
    SimulationSession,
};
