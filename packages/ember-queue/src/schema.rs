/// Statements are executed one by one; keep each terminated by a semicolon and
/// free of semicolons in string literals.
pub const SCHEMA_SQL: &str = "\
CREATE SEQUENCE IF NOT EXISTS tasks_seq;

CREATE TABLE IF NOT EXISTS tasks (
	task_id UUID PRIMARY KEY,
	kind TEXT NOT NULL,
	payload JSONB NOT NULL,
	priority TEXT NOT NULL,
	status TEXT NOT NULL DEFAULT 'queued',
	retries INTEGER NOT NULL DEFAULT 0,
	max_retries INTEGER NOT NULL DEFAULT 3,
	seq BIGINT NOT NULL DEFAULT nextval('tasks_seq'),
	created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
	processed_at TIMESTAMPTZ,
	completed_at TIMESTAMPTZ,
	last_failed_at TIMESTAMPTZ,
	result JSONB,
	last_error TEXT
);

CREATE INDEX IF NOT EXISTS tasks_claim_idx ON tasks (status, priority, seq);

CREATE INDEX IF NOT EXISTS tasks_archive_idx ON tasks (status, completed_at, last_failed_at);
";
