//! Executes one validated [`Operation`] against a session's mailbox.
//!
//! Every handler returns `Result<payload, OpError>`; callers only ever see the
//! flattened [`CommandResult`]. User-facing mail numbers are `index + 1`.

use log::{info, warn};
use serde_json::Value;

use crate::models::command_result::*;
use crate::models::email::{prompt_excerpt, FullContent, MessageSummary};
use crate::models::operation::Operation;
use crate::models::user_session::UserSession;
use crate::services::gmail_service::MailProvider;
use crate::services::link_service::{extract_domains, extract_urls, link_risk_prompt};
use crate::services::llm_service::{complete, LlmClient};
use crate::services::mail_stats::compute_statistics;
use crate::services::phishing_service::PhishingScorer;

/// The collaborators a handler may touch, passed in explicitly per call.
pub struct CommandContext<'a> {
    pub session: &'a mut UserSession,
    pub provider: &'a dyn MailProvider,
    pub llm: &'a dyn LlmClient,
    pub scorer: &'a PhishingScorer,
}

/// A mail picked from the snapshot before any side effect runs.
#[derive(Debug, Clone)]
struct Target {
    number: usize,
    summary: MessageSummary,
}

impl<'a> CommandContext<'a> {
    fn resolve(&self, index: i64) -> Result<Target, OpError> {
        let store = &self.session.mailbox;
        store
            .get_signed(index)
            .map(|summary| Target {
                number: index as usize + 1,
                summary: summary.clone(),
            })
            .ok_or(OpError::IndexOutOfRange {
                number: index.saturating_add(1),
                total: store.len(),
            })
    }

    fn resolve_many(&self, indices: &[usize]) -> Vec<Target> {
        indices
            .iter()
            .filter_map(|&i| {
                self.session.mailbox.get(i).map(|summary| Target {
                    number: i + 1,
                    summary: summary.clone(),
                })
            })
            .collect()
    }

    fn first_n(&self, n: usize) -> Vec<Target> {
        self.session
            .mailbox
            .messages()
            .into_iter()
            .take(n)
            .enumerate()
            .map(|(i, summary)| Target {
                number: i + 1,
                summary: summary.clone(),
            })
            .collect()
    }

    async fn full_content(&mut self, message_id: &str) -> FullContent {
        self.session.contents.get_full_content(self.provider, message_id).await
    }

    /// Trashes one mail and hides it from the snapshot.
    async fn trash(&mut self, message_id: &str) -> Result<(), OpError> {
        match self.provider.trash_message(message_id).await {
            Ok(()) => {
                self.session.mailbox.mark_deleted(message_id);
                self.session.contents.invalidate(message_id);
                info!("Trashed message {}", message_id);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to trash message {}: {}", message_id, e);
                Err(OpError::Provider(e.user_message()))
            }
        }
    }
}

/// Decodes a tool call (function name plus JSON-encoded arguments).
pub fn parse_call(name: &str, arguments: &str) -> Result<Operation, OpError> {
    let args: Value = if arguments.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(arguments).map_err(|e| OpError::InvalidArgument {
            name: "arguments".to_string(),
            detail: e.to_string(),
        })?
    };
    Operation::parse(name, &args)
}

/// Parses the raw tool call and executes it. `agent_analysis` is rejected here;
/// it is only reachable from the chat router.
pub async fn dispatch(ctx: &mut CommandContext<'_>, name: &str, arguments: &str) -> CommandResult {
    match parse_call(name, arguments) {
        Ok(op) => execute(ctx, op).await,
        Err(e) => {
            warn!("Rejected call to {}: {}", name, e);
            CommandResult::error(&e)
        }
    }
}

pub async fn execute(ctx: &mut CommandContext<'_>, op: Operation) -> CommandResult {
    info!("Executing {:?}", op);
    match op {
        Operation::MoveToTrash { message_id } => move_to_trash(ctx, &message_id).await.into(),
        Operation::DeleteByIndices { indices } => delete_by_indices(ctx, &indices).await.into(),
        Operation::SummarizeByIndices { indices } => summarize_by_indices(ctx, &indices).await.into(),
        Operation::GetMailContent { index } => get_mail_content(ctx, index).into(),
        Operation::CheckPhishing { index } => check_phishing(ctx, index).await.into(),
        Operation::SearchMails { query, max_results } => search_mails(ctx, &query, max_results).await.into(),
        Operation::BatchPhishingDelete { max_mails, threshold } => {
            batch_phishing_delete(ctx, max_mails, threshold).await.into()
        }
        Operation::MailStatistics { max_mails } => mail_statistics(ctx, max_mails).into(),
        Operation::AnalyzeLinkRisk { index } => match ctx.resolve(index) {
            Ok(target) => analyze_link_risk(ctx, target).await.into(),
            Err(e) => CommandResult::error(&e),
        },
        Operation::BatchAnalyzeLinkRisk { n } => batch_analyze_link_risk(ctx, n).await.into(),
        Operation::WebSearchMailContent { index, query } => web_search_mail(ctx, index, query).await.into(),
        Operation::AgentAnalysis { .. } => CommandResult::error(&OpError::UnknownFunction("agent_analysis".into())),
    }
}

async fn move_to_trash(ctx: &mut CommandContext<'_>, message_id: &str) -> Result<TrashResult, OpError> {
    let subject = ctx.session.mailbox.find(message_id).map(|m| m.subject.clone());
    ctx.trash(message_id).await?;
    let message = match subject {
        Some(subject) => format!("'{}' 메일을 휴지통으로 이동했습니다.", subject),
        None => format!("메일({})을 휴지통으로 이동했습니다.", message_id),
    };
    Ok(TrashResult {
        success: true,
        message_id: message_id.to_string(),
        message,
    })
}

async fn delete_by_indices(ctx: &mut CommandContext<'_>, indices: &[i64]) -> Result<DeleteResult, OpError> {
    let (valid, invalid_numbers) = ctx.session.mailbox.partition_indices(indices);
    if valid.is_empty() {
        return Err(OpError::NoValidIndices(invalid_numbers));
    }
    // Resolve ids first: each deletion shifts the visible indices.
    let targets = ctx.resolve_many(&valid);

    let mut results = Vec::with_capacity(targets.len());
    for target in targets {
        let outcome = ctx.trash(&target.summary.id).await;
        results.push(DeletedMail {
            number: target.number,
            subject: target.summary.subject,
            success: outcome.is_ok(),
            error: outcome.err().map(|e| e.to_string()),
        });
    }

    let deleted: Vec<String> = results
        .iter()
        .filter(|r| r.success)
        .map(|r| format!("{}번 메일 '{}'", r.number, r.subject))
        .collect();
    let failed = results.len() - deleted.len();

    let mut message = if deleted.is_empty() {
        "메일을 삭제하지 못했습니다.".to_string()
    } else {
        format!("{}개 메일 삭제 완료: {}", deleted.len(), deleted.join(", "))
    };
    if failed > 0 {
        message.push_str(&format!(" ({}개 실패)", failed));
    }
    if !invalid_numbers.is_empty() {
        let numbers: Vec<String> = invalid_numbers.iter().map(|n| format!("{}번", n)).collect();
        message.push_str(&format!(" 존재하지 않는 메일 번호: {}", numbers.join(", ")));
    }

    Ok(DeleteResult {
        success: !deleted.is_empty(),
        results,
        invalid_numbers,
        message,
    })
}

fn summary_prompt(subject: &str, sender: &str, body: &str) -> String {
    format!(
        "다음 이메일을 요약해줘.\n\n제목: {}\n발신자: {}\n내용: {}",
        subject,
        sender,
        prompt_excerpt(body)
    )
}

async fn summarize_by_indices(ctx: &mut CommandContext<'_>, indices: &[i64]) -> Result<SummariesResult, OpError> {
    let (valid, invalid_numbers) = ctx.session.mailbox.partition_indices(indices);
    if valid.is_empty() {
        return Err(OpError::NoValidIndices(invalid_numbers));
    }

    let mut summaries = Vec::new();
    for target in ctx.resolve_many(&valid) {
        let mail = &target.summary;
        let body = ctx
            .session
            .contents
            .peek(&mail.id)
            .and_then(FullContent::readable_text)
            .unwrap_or_else(|| mail.snippet.clone());
        let line = match complete(ctx.llm, summary_prompt(&mail.subject, &mail.sender, &body)).await {
            Ok(summary) => format!("[{}] {}: {}", target.number, mail.subject, summary),
            Err(e) => {
                warn!("Summary of {} failed: {}", mail.id, e);
                format!("[{}] 요약 실패: {}", target.number, e.user_message())
            }
        };
        summaries.push(line);
    }

    Ok(SummariesResult {
        summaries,
        invalid_numbers,
    })
}

fn get_mail_content(ctx: &CommandContext<'_>, index: i64) -> Result<MailContentResult, OpError> {
    let target = ctx.resolve(index)?;
    Ok(MailContentResult {
        number: target.number,
        subject: target.summary.subject,
        sender: target.summary.sender,
        snippet: target.summary.snippet,
    })
}

async fn check_phishing(ctx: &mut CommandContext<'_>, index: i64) -> Result<PhishingResult, OpError> {
    let target = ctx.resolve(index)?;
    ctx.scorer.ensure_loaded().map_err(|e| OpError::Scorer(e.to_string()))?;

    let content = ctx.full_content(&target.summary.id).await;
    if content.error {
        return Err(OpError::Provider(content.body_text));
    }
    let outcome = ctx
        .scorer
        .score(&content.subject, &content.body_text, &content.body_html)
        .map_err(|e| OpError::Scorer(e.to_string()))?;
    info!(
        "Mail {} scored label={} probability={:?}",
        target.number, outcome.label, outcome.probability
    );

    Ok(PhishingResult {
        subject: target.summary.subject,
        sender: target.summary.sender,
        result: outcome.verdict(),
        probability: outcome.probability,
    })
}

async fn search_mails(ctx: &mut CommandContext<'_>, query: &str, max_results: usize) -> Result<SearchResult, OpError> {
    let needle = query.to_lowercase();
    let hits: Vec<Target> = ctx
        .session
        .mailbox
        .messages()
        .into_iter()
        .enumerate()
        .filter(|(_, m)| {
            m.subject.to_lowercase().contains(&needle)
                || m.sender.to_lowercase().contains(&needle)
                || m.snippet.to_lowercase().contains(&needle)
        })
        .take(max_results)
        .map(|(i, m)| Target {
            number: i + 1,
            summary: m.clone(),
        })
        .collect();

    let mut results = Vec::with_capacity(hits.len());
    for target in hits {
        let mail = target.summary;
        let prompt = format!(
            "다음 이메일을 1~2문장으로 요약해줘.\n\n제목: {}\n발신자: {}\n내용: {}",
            mail.subject,
            mail.sender,
            prompt_excerpt(&mail.snippet)
        );
        let summary = match complete(ctx.llm, prompt).await {
            Ok(summary) => summary,
            Err(e) => format!("요약 실패: {}", e.user_message()),
        };
        results.push(SearchHit {
            number: target.number,
            subject: mail.subject,
            sender: mail.sender,
            snippet: mail.snippet,
            summary,
        });
    }

    Ok(SearchResult {
        query: query.to_string(),
        count: results.len(),
        results,
    })
}

async fn batch_phishing_delete(
    ctx: &mut CommandContext<'_>,
    max_mails: usize,
    threshold: f64,
) -> Result<BatchDeleteResult, OpError> {
    ctx.scorer.ensure_loaded().map_err(|e| OpError::Scorer(e.to_string()))?;
    if ctx.session.mailbox.is_empty() {
        return Err(OpError::EmptyMailbox);
    }

    let targets = ctx.first_n(max_mails);
    let mut checked = 0;
    let mut flagged = Vec::new();
    let mut errors = Vec::new();

    for target in targets {
        let mail = target.summary;
        let content = ctx.full_content(&mail.id).await;
        if content.error {
            errors.push(format!("[{}] {}", target.number, content.body_text));
            continue;
        }
        let outcome = match ctx.scorer.score(&content.subject, &content.body_text, &content.body_html) {
            Ok(outcome) => outcome,
            Err(e) => {
                errors.push(format!("[{}] {}", target.number, e));
                continue;
            }
        };
        checked += 1;

        let probability = outcome.effective_probability();
        if probability < threshold {
            continue;
        }
        let deleted = match ctx.trash(&mail.id).await {
            Ok(()) => true,
            Err(e) => {
                errors.push(format!("[{}] {}", target.number, e));
                false
            }
        };
        flagged.push(FlaggedMail {
            number: target.number,
            subject: mail.subject,
            sender: mail.sender,
            probability,
            deleted,
        });
    }

    let phishing_found = flagged.len();
    let deleted_count = flagged.iter().filter(|f| f.deleted).count();
    let message = format!(
        "{}개 메일 검사, 피싱 의심 {}개 발견, {}개 삭제 (기준 확률 {:.2})",
        checked, phishing_found, deleted_count, threshold
    );
    info!("Batch phishing delete: {}", message);

    Ok(BatchDeleteResult {
        checked,
        phishing_found,
        deleted_count,
        threshold,
        flagged,
        errors,
        message,
    })
}

fn mail_statistics(ctx: &CommandContext<'_>, max_mails: usize) -> Result<crate::services::mail_stats::MailStatistics, OpError> {
    let messages: Vec<&MessageSummary> = ctx.session.mailbox.messages().into_iter().take(max_mails).collect();
    if messages.is_empty() {
        return Err(OpError::EmptyMailbox);
    }
    Ok(compute_statistics(&messages))
}

async fn analyze_link_risk(ctx: &mut CommandContext<'_>, target: Target) -> Result<LinkRiskResult, OpError> {
    let content = ctx.full_content(&target.summary.id).await;
    if content.error {
        return Err(OpError::Provider(content.body_text));
    }

    let urls = extract_urls(&format!("{}\n{}", content.body_text, content.body_html));
    let domains = extract_domains(&urls);
    if domains.is_empty() {
        return Ok(LinkRiskResult {
            number: target.number,
            subject: target.summary.subject,
            urls,
            domains,
            analysis: "메일에 분석할 링크가 없습니다.".to_string(),
        });
    }

    let prompt = link_risk_prompt(&target.summary.subject, &target.summary.sender, &domains);
    let analysis = ctx
        .llm
        .web_search(prompt)
        .await
        .map_err(|e| OpError::Llm(e.user_message()))?;

    Ok(LinkRiskResult {
        number: target.number,
        subject: target.summary.subject,
        urls,
        domains,
        analysis,
    })
}

async fn batch_analyze_link_risk(ctx: &mut CommandContext<'_>, n: usize) -> Result<BatchLinkRiskResult, OpError> {
    let targets = ctx.first_n(n);
    if targets.is_empty() {
        return Err(OpError::EmptyMailbox);
    }

    let mut results = Vec::new();
    let mut errors = Vec::new();
    for target in targets {
        let number = target.number;
        match analyze_link_risk(ctx, target).await {
            Ok(result) => results.push(result),
            Err(e) => errors.push(format!("[{}] {}", number, e)),
        }
    }

    Ok(BatchLinkRiskResult {
        analyzed: results.len(),
        results,
        errors,
    })
}

async fn web_search_mail(
    ctx: &mut CommandContext<'_>,
    index: i64,
    query: Option<String>,
) -> Result<AnalysisResult, OpError> {
    let target = ctx.resolve(index)?;
    let mail = &target.summary;
    let body = ctx
        .full_content(&mail.id)
        .await
        .readable_text()
        .unwrap_or_else(|| mail.snippet.clone());

    let mail_block = format!(
        "제목: {}\n발신자: {}\n내용: {}",
        mail.subject,
        mail.sender,
        prompt_excerpt(&body)
    );
    let prompt = match query {
        Some(query) => format!(
            "다음 이메일과 관련하여 '{}'에 대해 웹 검색으로 조사하고 한국어로 답해줘.\n\n{}",
            query, mail_block
        ),
        None => format!(
            "다음 이메일을 웹 검색을 활용해 분석해줘. 발신자와 링크, 내용의 신뢰성을 확인하고 \
             피싱 가능성과 권장 조치를 한국어로 정리해줘.\n\n{}",
            mail_block
        ),
    };

    let analysis = ctx
        .llm
        .web_search(prompt)
        .await
        .map_err(|e| OpError::Llm(e.user_message()))?;

    Ok(AnalysisResult {
        number: target.number,
        subject: target.summary.subject.clone(),
        analysis,
        completed: true,
    })
}
