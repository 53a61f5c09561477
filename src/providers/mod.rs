pub mod rates_api;
pub mod supabase;
pub mod util;
