// Planner phases, in execution order
//
// Each phase fills one slot of the PipelineContext; later phases read the
// slots of earlier ones and fail loudly when a slot is unexpectedly empty.

#[path = "01_scan.rs"]
pub mod scan;
#[path = "02_base_image.rs"]
pub mod base_image;
#[path = "03_provision.rs"]
pub mod provision;
#[path = "04_entrypoint.rs"]
pub mod entrypoint;
#[path = "05_assemble.rs"]
pub mod assemble;
