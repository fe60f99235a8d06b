// Configuration
pub mod config;

// Connection state shared by the broker link and viewer sessions
pub mod link;

// Topic patterns and the fixed topic table
pub mod topic;

// MQTT broker integration
pub mod broker;

// Fan-out bridge to dashboard viewers
pub mod bridge;

// HTTP and WebSocket APIs
pub mod api;

// Payload validation
pub mod stream;

// Rolling view state
pub mod aggregate;

// Health derivation
pub mod health;

// Dashboard client
pub mod viewer;
