//! Document parse task: source file -> chapter/paragraph/sentence rows.

use narravo_models::{
    Chapter, Paragraph, ParserOptions, ProjectId, ProjectStatus, Sentence, UserId,
};
use tracing::info;

use crate::error::{WorkerError, WorkerResult};
use crate::WorkerContext;

/// Parse a project's uploaded document and persist the text hierarchy.
pub async fn run_parse_document(
    ctx: &WorkerContext,
    project_id: &ProjectId,
    owner_id: &UserId,
) -> WorkerResult<()> {
    let project = ctx.catalog.get_project(project_id).await?;
    if &project.owner_id != owner_id {
        return Err(WorkerError::validation(format!(
            "project {project_id} does not belong to {owner_id}"
        )));
    }

    let result = parse_and_persist(ctx, project_id).await;
    if let Err(ref e) = result {
        // The failure must land on the project row even when the catalog
        // write below is what broke.
        ctx.catalog
            .mark_project_failed(project_id, &e.to_string())
            .await
            .ok();
    }
    result
}

/// Reset a failed project, then parse it again.
pub async fn run_retry_failed_project(
    ctx: &WorkerContext,
    project_id: &ProjectId,
    owner_id: &UserId,
) -> WorkerResult<()> {
    ctx.catalog.reset_project_for_retry(project_id).await?;
    run_parse_document(ctx, project_id, owner_id).await
}

async fn parse_and_persist(ctx: &WorkerContext, project_id: &ProjectId) -> WorkerResult<()> {
    let project = ctx
        .catalog
        .set_project_status(project_id, ProjectStatus::Parsing, 10)
        .await?;

    // Fetch and decode the source document.
    let bytes = ctx.storage.download_bytes(&project.file_path).await?;
    let content = String::from_utf8(bytes)
        .map_err(|e| WorkerError::validation(format!("source file is not UTF-8: {e}")))?;
    if content.trim().is_empty() {
        return Err(WorkerError::validation("source file is empty"));
    }

    let parsed = ctx.parser.parse(&content, &ParserOptions::default());
    parsed
        .validate()
        .map_err(WorkerError::Validation)?;

    // Unconfirmed drafts from a previous parse are replaced wholesale.
    ctx.catalog.delete_project_content(project_id).await?;
    ctx.catalog
        .set_project_status(project_id, ProjectStatus::Parsing, 30)
        .await?;

    // Walk the three parallel arrays in traversal order.
    let mut paragraph_cursor = 0usize;
    let mut sentence_cursor = 0usize;
    let mut total_words = 0u32;

    for parsed_chapter in &parsed.chapters {
        let mut chapter = Chapter::new(
            project_id.clone(),
            &parsed_chapter.title,
            &parsed_chapter.content,
            parsed_chapter.chapter_number,
        );
        chapter.word_count = parsed_chapter.word_count;
        chapter.paragraph_count = parsed_chapter.paragraph_count;
        chapter.sentence_count = parsed_chapter.sentence_count;
        total_words += parsed_chapter.word_count;
        ctx.catalog.insert_chapter(&chapter).await?;

        let paragraph_range =
            paragraph_cursor..paragraph_cursor + parsed_chapter.paragraph_count as usize;
        paragraph_cursor = paragraph_range.end;

        for parsed_paragraph in &parsed.paragraphs[paragraph_range] {
            let mut paragraph = Paragraph::new(
                chapter.id.clone(),
                parsed_paragraph.order_index,
                &parsed_paragraph.content,
            );
            paragraph.word_count = parsed_paragraph.word_count;
            paragraph.sentence_count = parsed_paragraph.sentence_count;
            ctx.catalog.insert_paragraphs(&[paragraph.clone()]).await?;

            let sentence_range =
                sentence_cursor..sentence_cursor + parsed_paragraph.sentence_count as usize;
            sentence_cursor = sentence_range.end;

            let rows: Vec<Sentence> = parsed.sentences[sentence_range]
                .iter()
                .map(|parsed_sentence| {
                    let mut sentence = Sentence::new(
                        paragraph.id.clone(),
                        parsed_sentence.order_index,
                        &parsed_sentence.content,
                    );
                    sentence.word_count = parsed_sentence.word_count;
                    sentence
                })
                .collect();
            ctx.catalog.insert_sentences(&rows).await?;
        }
    }

    ctx.catalog
        .set_project_statistics(
            project_id,
            parsed.chapters.len() as u32,
            parsed.paragraphs.len() as u32,
            parsed.sentences.len() as u32,
            total_words,
        )
        .await?;
    ctx.catalog
        .set_project_status(project_id, ProjectStatus::Parsed, 100)
        .await?;

    info!(
        project = %project_id,
        chapters = parsed.chapters.len(),
        paragraphs = parsed.paragraphs.len(),
        sentences = parsed.sentences.len(),
        "document parsed"
    );
    Ok(())
}
