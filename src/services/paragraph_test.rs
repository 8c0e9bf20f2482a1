use serde_json::json;

use super::*;

// =============================================================================
// split_sentences
// =============================================================================

#[test]
fn splits_on_terminal_punctuation() {
    assert_eq!(
        split_sentences("Hello there. How are you? Great!"),
        vec!["Hello there.", "How are you?", "Great!"]
    );
}

#[test]
fn requires_whitespace_after_terminator() {
    assert_eq!(split_sentences("Version 2.5 is out.Really"), vec!["Version 2.5 is out.Really"]);
    assert_eq!(split_sentences("e.g. this"), vec!["e.g.", "this"]);
}

#[test]
fn collapses_runs_of_whitespace_and_newlines() {
    assert_eq!(split_sentences("One.\n\n  Two!\tThree"), vec!["One.", "Two!", "Three"]);
}

#[test]
fn keeps_trailing_fragment_without_terminator() {
    assert_eq!(split_sentences("Done. and then"), vec!["Done.", "and then"]);
}

#[test]
fn blank_content_has_no_sentences() {
    assert!(split_sentences("").is_empty());
    assert!(split_sentences("   \n ").is_empty());
}

#[test]
fn trims_leading_whitespace() {
    assert_eq!(split_sentences("  Lead. Follow.  "), vec!["Lead.", "Follow."]);
}

#[test]
fn handles_non_ascii_text() {
    assert_eq!(split_sentences("Xin chào. Tạm biệt!"), vec!["Xin chào.", "Tạm biệt!"]);
}

#[test]
fn repeated_terminators_stay_together() {
    assert_eq!(split_sentences("Wait... What?! Yes"), vec!["Wait...", "What?!", "Yes"]);
}

// =============================================================================
// annotated_text
// =============================================================================

fn sentence(annotations: Option<Value>) -> Sentence {
    Sentence {
        id: Uuid::new_v4(),
        paragraph_id: Uuid::new_v4(),
        content: "The cat sat.".into(),
        position: 0,
        annotations,
    }
}

#[test]
fn annotated_text_reads_field() {
    let s = sentence(Some(json!({ "annotatedText": "[cat|con mèo]", "lastUpdated": "x" })));
    assert_eq!(annotated_text(&s), Some("[cat|con mèo]"));
}

#[test]
fn annotated_text_missing_or_empty() {
    assert_eq!(annotated_text(&sentence(None)), None);
    assert_eq!(annotated_text(&sentence(Some(json!({ "annotatedText": "" })))), None);
    assert_eq!(annotated_text(&sentence(Some(json!({ "other": 1 })))), None);
}

#[test]
fn sentence_serializes_position_as_order() {
    let json = serde_json::to_value(sentence(None)).unwrap();
    assert_eq!(json["order"], 0);
    assert!(json.get("paragraphId").is_some());
}

// =============================================================================
// insert_position
// =============================================================================

#[test]
fn insert_position_appends_without_order() {
    assert_eq!(insert_position(None, 0), 0);
    assert_eq!(insert_position(None, 3), 3);
}

#[test]
fn insert_position_keeps_slot_inside_range() {
    assert_eq!(insert_position(Some(0), 3), 0);
    assert_eq!(insert_position(Some(3), 3), 3);
}

#[test]
fn insert_position_caps_order_past_the_end() {
    assert_eq!(insert_position(Some(99), 2), 2);
    assert_eq!(insert_position(Some(5), 0), 0);
}

// =============================================================================
// DB-backed ordering
// =============================================================================

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;

    async fn seeded() -> (PgPool, Uuid, Uuid) {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL");
        let pool = crate::db::init_pool(&url).await.expect("pool");
        let user_id: Uuid = sqlx::query_scalar(
            "INSERT INTO users (username, name, password_hash) VALUES ($1, 'T', 'h') RETURNING id",
        )
        .bind(format!("u-{}", Uuid::new_v4()))
        .fetch_one(&pool)
        .await
        .unwrap();
        let article_id: Uuid =
            sqlx::query_scalar("INSERT INTO articles (title, author_id) VALUES ('T', $1) RETURNING id")
                .bind(user_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        (pool, user_id, article_id)
    }

    fn contents(paragraphs: &[Paragraph]) -> Vec<(&str, i32)> {
        paragraphs.iter().map(|p| (p.content.as_str(), p.position)).collect()
    }

    #[tokio::test]
    async fn insert_shifts_and_delete_compacts() {
        let (pool, user, article) = seeded().await;
        create_paragraph(&pool, user, article, "A. a.", None).await.unwrap();
        let b = create_paragraph(&pool, user, article, "B.", None).await.unwrap();
        create_paragraph(&pool, user, article, "X.", Some(1)).await.unwrap();

        let listed = list_paragraphs(&pool, article).await.unwrap();
        assert_eq!(contents(&listed), vec![("A. a.", 0), ("X.", 1), ("B.", 2)]);
        assert_eq!(listed[0].sentences.len(), 2);

        delete_paragraph(&pool, user, article, listed[1].id).await.unwrap();
        let listed = list_paragraphs(&pool, article).await.unwrap();
        assert_eq!(contents(&listed), vec![("A. a.", 0), ("B.", 1)]);

        create_paragraph(&pool, user, article, "Z.", Some(99)).await.unwrap();
        let listed = list_paragraphs(&pool, article).await.unwrap();
        assert_eq!(contents(&listed), vec![("A. a.", 0), ("B.", 1), ("Z.", 2)]);

        let updated = update_paragraph(&pool, user, article, b.id, "One. Two. Three.").await.unwrap();
        assert_eq!(updated.sentences.len(), 3);

        let stranger = Uuid::new_v4();
        assert!(matches!(
            delete_paragraph(&pool, stranger, article, b.id).await,
            Err(ParagraphError::Forbidden(_))
        ));
    }
}
