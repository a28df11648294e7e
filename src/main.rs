mod bootstrap;
mod catalog;
mod controller;
mod data_loaders;
mod error;
mod hotkey;
mod icon;
mod logging;
mod model;
mod utility;
mod view;
#[cfg(windows)]
mod win32;

use crate::{
	data_loaders::config::SwitcherConfig,
	error::SwitcherError,
	utility::{app_root_dir, config_path},
};

pub const DEBUG_NAME: &str = "SWITCHER";

fn main() -> Result<(), SwitcherError> {
	logging::init(false, "info");
	bootstrap::bootstrap(&app_root_dir());

	let config_path = config_path();
	let config = SwitcherConfig::load_or_default(&config_path);

	logging::set_level(config.debug, &config.log_level);
	std::panic::set_hook(Box::new(|panic_info| {
		error!("[{}] Panic: {}", DEBUG_NAME, panic_info);
	}));

	info!("!---------- [{}] Starting Window Switcher {} ----------!", DEBUG_NAME, env!("CARGO_PKG_VERSION"));
	info!("[{}] Config loaded from {}", DEBUG_NAME, config_path.display());
	info!("[{}] Logging to {}", DEBUG_NAME, logging::log_file().display());

	let result = run(config);
	if let Err(e) = &result {
		error!("[{}] Fatal: {}", DEBUG_NAME, e);
	}
	result
}

#[cfg(windows)]
fn run(config: SwitcherConfig) -> Result<(), SwitcherError> {
	use std::io::{self, BufReader};

	use crate::{
		catalog::ExclusionRules,
		controller::{spawn_intent_reader, AppEvent, Controller, JsonLinePresenter},
		hotkey::Chord,
		utility::own_process_name,
		win32::{actions::Win32Actions, Win32CatalogSource},
	};

	let chord: Chord = config.hotkey.chord.parse()?;

	if let Some(path) = &config.icons.fallback {
		icon::install_fallback(path);
	}

	let rules = ExclusionRules::with_extra(
		&config.catalog.excluded_classes,
		&config.catalog.excluded_processes,
	)
	.excluding_self(&own_process_name());

	let controller = Controller::new(
		Win32CatalogSource::new(rules),
		Win32Actions,
		JsonLinePresenter::new(io::stdout()),
		config.controller_settings(),
	);

	let activation = controller.sender();
	let mut listener = win32::hotkey::start(chord, config.hotkey.strategy, move || {
		let _ = activation.send(AppEvent::Activated);
	})?;

	spawn_intent_reader(BufReader::new(io::stdin()), controller.sender())?;

	controller.run();
	listener.stop();

	info!("[{}] Shut down cleanly", DEBUG_NAME);
	Ok(())
}

#[cfg(not(windows))]
fn run(_config: SwitcherConfig) -> Result<(), SwitcherError> {
	Err(SwitcherError::UnsupportedPlatform)
}
