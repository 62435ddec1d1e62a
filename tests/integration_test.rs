use std::sync::Arc;

use caption_rewriter::error::RewriteError;
use caption_rewriter::models::{import_spreadsheet, import_spreadsheet_bytes};
use caption_rewriter::services::{
    diff_chars, DiffKind, Exporter, FileStore, HistoryStore, LlmService, ProviderRegistry,
    RewriteOutput, RewriteRequest,
};
use caption_rewriter::{run_batch, BatchState, CancelFlag, CaptionRow, Config, RowStatus, Session};
use pretty_assertions::assert_eq;
use rust_xlsxwriter::Workbook;

fn input_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let rows: [[&str; 2]; 4] = [
        ["ID", "Caption"],
        ["a", "a cat sits on the mat"],
        ["b", "FAIL this one"],
        ["c", "a dog runs"],
    ];
    for (r, cells) in rows.iter().enumerate() {
        for (c, text) in cells.iter().enumerate() {
            sheet.write_string(r as u32, c as u16, *text).unwrap();
        }
    }
    workbook.save_to_buffer().unwrap()
}

/// 代替 LLM 的转换：首字母大写，带 FAIL 的行失败
async fn fake_rewrite(row: CaptionRow) -> Result<RewriteOutput, RewriteError> {
    if row.original.contains("FAIL") {
        return Err(RewriteError::api_failed("fake", "upstream 500"));
    }
    let mut chars = row.original.chars();
    let rewritten = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str() + ".",
        None => String::new(),
    };
    Ok(RewriteOutput {
        rewritten,
        extracted_original: None,
    })
}

#[tokio::test]
async fn test_import_rewrite_export_reimport() {
    let rows = import_spreadsheet_bytes(&input_workbook()).unwrap();
    assert_eq!(rows.len(), 3);

    let mut state = BatchState::new(rows);
    let report = run_batch(&mut state, Arc::new(fake_rewrite), 3, &CancelFlag::new()).await;
    assert_eq!((report.completed, report.failed), (2, 1));

    let rows = state.into_rows();
    assert_eq!(rows[0].rewritten.as_deref(), Some("A cat sits on the mat."));
    assert_eq!(rows[1].status, RowStatus::Error);
    assert!(rows[1].error.as_deref().unwrap().contains("upstream 500"));

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("result.xlsx");
    Exporter::export_to_file(&rows, &output).unwrap();

    let reloaded = import_spreadsheet(&output).await.unwrap();
    assert_eq!(reloaded.len(), 3);
    for (before, after) in rows.iter().zip(&reloaded) {
        assert_eq!(after.id, before.id);
        assert_eq!(after.original, before.original);
        assert_eq!(after.rewritten, before.rewritten);
        assert_eq!(after.status, before.status);
    }

    // 再次运行只处理失败的行
    let mut state = BatchState::new(reloaded);
    assert_eq!(state.pending_indices(), vec![1]);
    let report = run_batch(&mut state, Arc::new(fake_rewrite), 3, &CancelFlag::new()).await;
    assert_eq!(report.dispatched, 1);
}

#[test]
fn test_history_persists_across_store_instances() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("history.json");

    let rows = vec![
        CaptionRow::new("1", "a cat").with_image_data("data:image/png;base64,AAAA"),
        CaptionRow::new("2", "a dog"),
    ];
    let session = Session::snapshot("morning batch", &rows);

    let history = HistoryStore::new(FileStore::new(&path, None));
    history.save_session(&session).unwrap();

    let reopened = HistoryStore::new(FileStore::new(&path, None));
    let sessions = reopened.list_sessions().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].name, "morning batch");
    assert_eq!(sessions[0].stats.total, 2);
    assert!(sessions[0].rows.iter().all(|r| r.image_data.is_none()));

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(!raw.contains("base64"));
}

#[test]
fn test_history_keeps_twenty_newest() {
    let dir = tempfile::tempdir().unwrap();
    let history = HistoryStore::new(FileStore::new(dir.path().join("h.json"), None));

    let mut ids = Vec::new();
    for i in 0..25 {
        let mut session = Session::snapshot(format!("batch {}", i), &[CaptionRow::new("1", "x")]);
        session.id = format!("session_{}", i);
        history.save_session(&session).unwrap();
        ids.push(session.id);
    }

    let kept: Vec<String> = history
        .list_sessions()
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    let expected: Vec<String> = ids.iter().rev().take(20).cloned().collect();
    assert_eq!(kept, expected);
}

#[test]
fn test_diff_reconstructs_both_sides() {
    let segments = diff_chars("图片中有一只猫", "图片里有两只猫");
    let original: String = segments
        .iter()
        .filter(|s| s.kind != DiffKind::Added)
        .map(|s| s.text.as_str())
        .collect();
    let rewritten: String = segments
        .iter()
        .filter(|s| s.kind != DiffKind::Removed)
        .map(|s| s.text.as_str())
        .collect();
    assert_eq!(original, "图片中有一只猫");
    assert_eq!(rewritten, "图片里有两只猫");
}

#[test]
fn test_vision_request_rejected_by_text_only_provider() {
    let config = Config {
        llm_api_key: "key".to_string(),
        llm_model_name: "deepseek-chat".to_string(),
        ..Config::default()
    };
    let provider = ProviderRegistry::default().resolve_config(&config).unwrap();
    let service = LlmService::new(&config, provider);

    let request = RewriteRequest {
        text: None,
        image: Some("data:image/png;base64,AAAA".to_string()),
        instruction: "rewrite".to_string(),
    };
    let result = tokio_test::block_on(service.rewrite(&request));
    assert!(matches!(result, Err(RewriteError::VisionUnsupported { .. })));
}

#[tokio::test]
#[ignore] // 默认忽略，需要手动运行：cargo test -- --ignored
async fn test_live_rewrite() {
    let config = Config::from_env().expect("加载配置失败");
    let provider = ProviderRegistry::default()
        .resolve_config(&config)
        .expect("无法识别服务商");
    let service = LlmService::new(&config, provider);

    let request = RewriteRequest {
        text: Some("a cat sit on mat".to_string()),
        image: None,
        instruction: config.system_instruction.clone(),
    };
    let output = service.rewrite(&request).await.expect("改写失败");
    assert!(!output.rewritten.is_empty());
}
