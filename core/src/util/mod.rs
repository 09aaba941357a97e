pub mod fast_map;
pub mod spell;
