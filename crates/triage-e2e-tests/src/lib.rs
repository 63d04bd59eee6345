//! End-to-end integration tests for Triage.
//!
//! These tests exercise the assembled engine:
//! - Error reports flowing into incidents, categories and actions
//! - Escalation by affected users and frequency
//! - Alert routing, rate limiting and channel failure isolation
//! - Metric thresholds, ring buffers and Prometheus export

#![cfg(test)]
