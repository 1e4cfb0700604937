//! Transport-agnostic command protocol subsystem.
//!
//! JSON envelopes, chunked over a size-limited frame channel.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    Responder (device)                      │
//! │                                                            │
//! │  ┌──────────┐   ┌────────────┐   ┌──────────┐   ┌────────┐ │
//! │  │ Transport│──▶│ Reassembler│──▶│ Envelope │──▶│ Engine │ │
//! │  │ (trait)  │   │ (chunked)  │   │ (decode) │   │ + Busy │ │
//! │  └──────────┘   └────────────┘   └──────────┘   └────────┘ │
//! │       ▲                                             │      │
//! │       │         ┌─────────┐   ┌──────────┐          │      │
//! │       └─────────│ Chunker │◀──│ Outbox   │◀─────────┘      │
//! │                 └─────────┘   └──────────┘  progress +     │
//! │                                             terminal       │
//! └────────────────────────────────────────────────────────────┘
//!
//!  Caller side: CorrelationTracker ── same envelope + chunked stack
//! ```

pub mod busy;
pub mod cancel;
pub mod channels;
pub mod chunked;
pub mod codec;
pub mod correlation;
pub mod engine;
pub mod envelope;
pub mod io_task;
pub mod registry;
pub mod reporter;
pub mod transport;
