//! Cutting-family rules (cutting and additive)
//!
//! The cutting family is the baseline of the pipeline: tool changes,
//! macro calls, process on/off selection and the precision dwells are all
//! base behavior, so these rules add nothing on top. Plasma extends this
//! family with its own triggers; see `plasma.rs`.

use super::ProcessRules;

pub struct CuttingRules;

impl ProcessRules for CuttingRules {}
