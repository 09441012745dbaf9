pub(super) fn default_name() -> String {
    "herald".to_string()
}
pub(super) fn default_data_dir() -> String {
    "~/.herald".to_string()
}
pub(super) fn default_log_level() -> String {
    "info".to_string()
}
pub(super) fn default_device_name() -> String {
    "HERALD".to_string()
}
pub(super) fn default_trunk_prefix() -> String {
    "0".to_string()
}
pub(super) fn default_country_code() -> String {
    "62".to_string()
}
pub(super) fn default_address_suffix() -> String {
    "@s.whatsapp.net".to_string()
}
pub(super) fn default_min_delay_ms() -> u64 {
    3000
}
pub(super) fn default_max_delay_ms() -> u64 {
    7000
}
pub(super) fn default_event_buffer() -> usize {
    256
}
