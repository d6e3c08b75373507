pub fn render_schema(vector_dim: u32) -> String {
	let init = include_str!("../../../sql/init.sql");
	let expanded = expand_includes(init);

	expanded.replace("<VECTOR_DIM>", &vector_dim.to_string())
}

/// Splits rendered SQL into executable statements.
pub fn statements(sql: &str) -> impl Iterator<Item = &str> {
	sql.split(';').map(str::trim).filter(|statement| !statement.is_empty())
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"00_extensions.sql" => out.push_str(include_str!("../../../sql/00_extensions.sql")),
				"tables/001_styles.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_styles.sql")),
				"tables/002_tones.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_tones.sql")),
				"tables/003_topics.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_topics.sql")),
				"tables/004_topic_windows.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_topic_windows.sql")),
				"tables/005_questions.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_questions.sql")),
				"tables/006_question_embeddings.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_question_embeddings.sql")),
				"tables/007_users.sql" =>
					out.push_str(include_str!("../../../sql/tables/007_users.sql")),
				"tables/008_user_questions.sql" =>
					out.push_str(include_str!("../../../sql/tables/008_user_questions.sql")),
				"tables/009_user_hidden_attributes.sql" => out
					.push_str(include_str!("../../../sql/tables/009_user_hidden_attributes.sql")),
				"tables/010_duplicate_detections.sql" =>
					out.push_str(include_str!("../../../sql/tables/010_duplicate_detections.sql")),
				"tables/011_duplicate_sweeps.sql" =>
					out.push_str(include_str!("../../../sql/tables/011_duplicate_sweeps.sql")),
				"tables/012_job_outbox.sql" =>
					out.push_str(include_str!("../../../sql/tables/012_job_outbox.sql")),
				"tables/013_pool_runs.sql" =>
					out.push_str(include_str!("../../../sql/tables/013_pool_runs.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
