//! Profiles command - list timing profiles

use obdscan::ScanConfig;

use crate::output::{OutputContext, ProfileRow};

/// List builtin and configured timing profiles
pub fn profiles(config: &ScanConfig, ctx: &OutputContext) {
    let rows: Vec<ProfileRow> = config
        .profile_names()
        .into_iter()
        .filter_map(|name| {
            let profile = config.timing_profile(&name).ok()?;
            Some(ProfileRow {
                source: if config.profiles.contains_key(&name) {
                    "config".to_string()
                } else {
                    "builtin".to_string()
                },
                selected: if name == config.profile {
                    "*".to_string()
                } else {
                    String::new()
                },
                name,
                inter_probe_delay_ms: profile.inter_probe_delay_ms,
                module_response_timeout_ms: profile.module_response_timeout_ms,
                dtc_collection_window_ms: profile.dtc_collection_window_ms,
                baud_detect_window_ms: profile.baud_detect_window_ms,
            })
        })
        .collect();

    ctx.print(&rows);
}
