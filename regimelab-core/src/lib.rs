//! RegimeLab Core: regime detection and the regime-gated backtest engine.
//!
//! - Domain types (bars, trades, equity points, regime labels)
//! - Feature extraction (log return, range, rolling return volatility)
//! - Gaussian HMM with Baum–Welch fitting and Viterbi/forward inference
//! - Regime detector that labels HMM states Bull/Bear/Neutral
//! - Technical indicators and the eight-condition entry vote
//! - Position state machine with post-exit cooldown
//! - Bar-by-bar leveraged simulator (batch and streaming)

pub mod conditions;
pub mod domain;
pub mod engine;
pub mod features;
pub mod hmm;
pub mod indicators;
pub mod regime;
