/*!
 * Protocol layer — data structures and constants.
 *
 * Everything related to *what* we hand to providers:
 * - `types` — ErrorReport, Severity, Environment, ReportBuilder
 * - `constants` — storage keys, header names, env var names, SDK version
 */

pub mod constants;
pub mod types;
