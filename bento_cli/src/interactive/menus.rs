//! Interactive menu options.
//!
//! Commands must be unique across all menus. The same command in two menus runs the same action.
pub type Menu = (&'static str, &'static [&'static str]);

// Command aliases. Keep this list in alphabetical order.
pub mod commands {
    pub const CLOSE_VALVE: &str = "Close valve";
    pub const ENTER_ADDRESS: &str = "Enter controller address";
    pub const EXIT: &str = "Exit";
    pub const FETCH_ADDRESS: &str = "Fetch controller address (USB console)";
    pub const GIMATIC_CLOSE: &str = "Close gripper";
    pub const GIMATIC_OPEN: &str = "Open gripper";
    pub const GIMATIC_STATUS: &str = "Gripper status";
    pub const NAV_BACK: &str = "Back";
    pub const NAV_TO_CONNECTION_MENU: &str = "Controller connection";
    pub const NAV_TO_GRIPPER_MENU: &str = "Gimatic gripper";
    pub const NAV_TO_TEST_MENU: &str = "Automated tests";
    pub const NAV_TO_VALVE_MENU: &str = "Pneumatic valves";
    pub const OPEN_VALVE: &str = "Open valve";
    pub const READ_PRESSURE: &str = "Read pressure";
    pub const READ_VALVE_STATE: &str = "Read valve state";
    pub const REFRESH_STATUS: &str = "Refresh status";
    pub const RUN_GIMATIC_TEST: &str = "Run gripper test";
    pub const RUN_VALVE_TEST: &str = "Run valve test";
    pub const SAVE_ADDRESS: &str = "Save controller address to config file";
}

pub use commands::*;

pub const TOP_MENU: [&str; 6] =
    [NAV_TO_CONNECTION_MENU, NAV_TO_VALVE_MENU, NAV_TO_GRIPPER_MENU, NAV_TO_TEST_MENU, REFRESH_STATUS, EXIT];

pub const CONNECTION_MENU: [&str; 6] = [FETCH_ADDRESS, ENTER_ADDRESS, SAVE_ADDRESS, REFRESH_STATUS, NAV_BACK, EXIT];

pub const VALVE_MENU: [&str; 7] =
    [OPEN_VALVE, CLOSE_VALVE, READ_VALVE_STATE, READ_PRESSURE, REFRESH_STATUS, NAV_BACK, EXIT];

pub const GRIPPER_MENU: [&str; 6] = [GIMATIC_OPEN, GIMATIC_CLOSE, GIMATIC_STATUS, REFRESH_STATUS, NAV_BACK, EXIT];

pub const TEST_MENU: [&str; 5] = [RUN_VALVE_TEST, RUN_GIMATIC_TEST, REFRESH_STATUS, NAV_BACK, EXIT];

pub fn top_menu() -> &'static Menu {
    &("Main", &TOP_MENU)
}

pub fn connection_menu() -> &'static Menu {
    &("Connection", &CONNECTION_MENU)
}

pub fn valve_menu() -> &'static Menu {
    &("Valves", &VALVE_MENU)
}

pub fn gripper_menu() -> &'static Menu {
    &("Gripper", &GRIPPER_MENU)
}

pub fn test_menu() -> &'static Menu {
    &("Tests", &TEST_MENU)
}
