use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{
    conversation_id, ConversationResponse, Message, MessageResponse, MessagesQuery,
    SendMessageRequest,
};
use crate::utils::validators::sanitize_string;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(send_message))
        .route("/conversations", get(list_conversations))
        .route("/conversations/:user_id", get(get_conversation))
}

async fn build_message_response(state: &AppState, message: Message) -> AppResult<MessageResponse> {
    let sender_name = sqlx::query_as::<_, (String, String)>(
        "SELECT first_name, last_name FROM users WHERE id = $1",
    )
    .bind(message.sender_id)
    .fetch_optional(&state.pool)
    .await?
    .map(|(f, l)| format!("{} {}", f, l))
    .unwrap_or_default();

    Ok(MessageResponse {
        id: message.id,
        conversation_id: message.conversation_id,
        sender_id: message.sender_id,
        sender_name,
        recipient_id: message.recipient_id,
        property_id: message.property_id,
        subject: message.subject,
        content: message.content,
        is_read: message.is_read,
        created_at: message.created_at,
    })
}

/// Send a message to another user
#[utoipa::path(
    post,
    path = "/api/v1/messages",
    tag = "messages",
    security(("bearer_auth" = [])),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Message sent", body = MessageResponse),
        (status = 404, description = "Recipient not found"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<SendMessageRequest>,
) -> AppResult<Json<MessageResponse>> {
    let content = sanitize_string(&payload.content);
    if content.is_empty() {
        return Err(AppError::Validation(
            "Message content is required".to_string(),
        ));
    }

    if payload.recipient_id == auth_user.user_id {
        return Err(AppError::Validation(
            "Cannot send a message to yourself".to_string(),
        ));
    }

    let recipient: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM users WHERE id = $1 AND is_active = true")
            .bind(payload.recipient_id)
            .fetch_optional(&state.pool)
            .await?;

    if recipient.is_none() {
        return Err(AppError::NotFound("Recipient not found".to_string()));
    }

    let conversation = conversation_id(auth_user.user_id, payload.recipient_id);

    let message = sqlx::query_as::<_, Message>(
        r#"
        INSERT INTO messages
            (conversation_id, sender_id, recipient_id, property_id, subject, content)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(&conversation)
    .bind(auth_user.user_id)
    .bind(payload.recipient_id)
    .bind(payload.property_id)
    .bind(&payload.subject)
    .bind(&content)
    .fetch_one(&state.pool)
    .await?;

    let response = build_message_response(&state, message).await?;
    Ok(Json(response))
}

/// The caller's conversations with the last message and unread count
#[utoipa::path(
    get,
    path = "/api/v1/messages/conversations",
    tag = "messages",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Conversation list", body = Vec<ConversationResponse>)
    )
)]
pub async fn list_conversations(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Vec<ConversationResponse>>> {
    // One row per conversation partner, with the newest message and the
    // count of their messages the caller has not read yet.
    let rows: Vec<(String, Uuid, String, String, String, chrono::DateTime<chrono::Utc>, i64)> =
        sqlx::query_as(
            r#"
            SELECT DISTINCT ON (m.conversation_id)
                m.conversation_id,
                u.id,
                u.first_name,
                u.last_name,
                m.content,
                m.created_at,
                (SELECT COUNT(*) FROM messages
                 WHERE conversation_id = m.conversation_id
                   AND recipient_id = $1
                   AND is_read = false)
            FROM messages m
            JOIN users u ON u.id = CASE WHEN m.sender_id = $1 THEN m.recipient_id ELSE m.sender_id END
            WHERE m.sender_id = $1 OR m.recipient_id = $1
            ORDER BY m.conversation_id, m.created_at DESC
            "#,
        )
        .bind(auth_user.user_id)
        .fetch_all(&state.pool)
        .await?;

    let mut conversations: Vec<ConversationResponse> = rows
        .into_iter()
        .map(
            |(conversation_id, other_id, first, last, content, created_at, unread)| {
                ConversationResponse {
                    conversation_id,
                    other_user_id: other_id,
                    other_user_name: format!("{} {}", first, last),
                    last_message: content,
                    last_message_at: created_at,
                    unread_count: unread,
                }
            },
        )
        .collect();

    conversations.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));

    Ok(Json(conversations))
}

/// Messages exchanged with one user, newest page first. Fetching the
/// conversation marks the other side's messages as read.
#[utoipa::path(
    get,
    path = "/api/v1/messages/conversations/{user_id}",
    tag = "messages",
    security(("bearer_auth" = [])),
    params(
        ("user_id" = Uuid, Path, description = "Conversation partner"),
        MessagesQuery
    ),
    responses(
        (status = 200, description = "Messages", body = Vec<MessageResponse>)
    )
)]
pub async fn get_conversation(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(user_id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> AppResult<Json<Vec<MessageResponse>>> {
    let limit = query.limit.unwrap_or(50).min(200);
    let offset = query.page.unwrap_or(0) * limit;

    let conversation = conversation_id(auth_user.user_id, user_id);

    let messages = sqlx::query_as::<_, Message>(
        r#"
        SELECT * FROM messages
        WHERE conversation_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(&conversation)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    sqlx::query(
        r#"
        UPDATE messages
        SET is_read = true, read_at = NOW()
        WHERE conversation_id = $1 AND recipient_id = $2 AND is_read = false
        "#,
    )
    .bind(&conversation)
    .bind(auth_user.user_id)
    .execute(&state.pool)
    .await?;

    let mut response = Vec::new();
    for message in messages {
        response.push(build_message_response(&state, message).await?);
    }

    Ok(Json(response))
}
