pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# PAGEVIEWSYNC CONFIGURATION
# =============================================================================
# Incrementally copies Canvas page views for a list of users into DuckDB.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/pageviewsync/config.yml
#   3. /etc/pageviewsync/config.yml
#
# $env{...} references are replaced with environment variables before parsing.

# =============================================================================
# API
# =============================================================================
api:
  # Scheme and host of the Canvas instance
  base_url: https://canvas.instructure.com
  # File containing the bearer token used for every request
  token_file: ~/.config/pageviewsync/token
  # Page size requested from /api/v1/users/{id}/page_views
  per_page: 1000
  # Timeout applied to each HTTP request
  request_timeout: 30s

# =============================================================================
# SYNC
# =============================================================================
sync:
  # Comma or newline separated user ids
  users_file: ~/.config/pageviewsync/users.txt
  # Additional user ids can be listed inline
  users: []
  # Maximum number of users synced concurrently
  max_workers: 10
  # Give up on a single user after this long (remove for no deadline)
  task_timeout: 15m
  # Fail a user whose pages are not returned newest-first
  ordering_check: true
  # Capacity of the progress notice queue
  progress_buffer: 1024
  # Runtime worker threads (defaults to the number of CPUs)
  # worker_threads: 4

# =============================================================================
# STORAGE
# =============================================================================
storage:
  path: ~/.local/share/pageviewsync/pageviews.duckdb
  table: pageviews
"#
    .to_string()
}
