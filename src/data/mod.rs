//! Data layer: sample model, reading, normalization, scanning, cleaning
//! and the index cache.
//!
//! Architecture:
//! ```text
//!  <root>/Dark, <root>/White, <root>/<measurement>...
//!        │
//!        ▼
//!   ┌──────────┐   ┌───────────┐
//!   │  loader   │──▶│ normalize  │  references → Normalizer
//!   └──────────┘   └───────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │   scan    │  folders → candidate SampleDescriptors (+ pairs)
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐   ┌──────────┐
//!   │  filter   │◀─▶│  cache    │  mean signal ≥ threshold → cleaned index
//!   └──────────┘   └──────────┘
//! ```

pub mod cache;
pub mod filter;
pub mod loader;
pub mod model;
pub mod normalize;
pub mod scan;
