pub mod mac;
pub mod registry;
pub mod wol;
