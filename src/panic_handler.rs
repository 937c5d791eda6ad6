use std::panic;

/// Install panic reporting for the CLI.
///
/// Debug builds get `better_panic` backtraces, release builds the
/// `human_panic` crash report. Either way the panic is also written to the
/// log file before the process exits.
pub fn initialize_panic_handler() {
    #[cfg(debug_assertions)]
    better_panic::install();

    #[cfg(not(debug_assertions))]
    human_panic::setup_panic!();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        log::error!("Panic: {panic_info}");
        log::logger().flush();

        default_hook(panic_info);

        std::process::exit(1);
    }));
}
