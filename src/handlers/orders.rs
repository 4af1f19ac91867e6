use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
};

use crate::{
    AppState,
    auth::AuthUser,
    error::AppError,
    extract::JsonBody,
    lookup::{CallerContext, LookupError},
    models::CreateOrderRequest,
    response::{ApiResponse, created},
    validation,
    views::{OrderView, UrlBase},
};

/// create_order
///
/// [Authenticated Route] Places an order for `user_id`. The user is fetched through
/// the `UserLookup` seam with the caller's own credentials, so placing an order for
/// someone else needs the same rights as reading that user. Without them the user
/// is reported as not found.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order placed", body = OrderView),
        (status = 404, description = "User Not Found or not accessible to the caller")
    )
)]
pub async fn create_order(
    caller: AuthUser,
    State(state): State<AppState>,
    base: UrlBase,
    headers: HeaderMap,
    JsonBody(payload): JsonBody<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderView>>), AppError> {
    let (user_id, product_id) = validation::validate_order(&payload)?;

    let context = CallerContext {
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        base,
    };
    // A user the caller may not see is reported the same as one that does not exist.
    let user = state
        .users
        .fetch_user(user_id, &context)
        .await
        .map_err(|e| match e {
            LookupError::Forbidden => LookupError::NotFound,
            other => other,
        })?;

    let order = state.repo.create_order(user_id, product_id).await?;

    tracing::info!(order_id = order.id, user_id = %user_id, product_id, by = %caller.id, "order placed");
    Ok(created("Order created", OrderView::new(&order, user)))
}
