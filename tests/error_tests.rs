// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::http::StatusCode;
use axum::response::IntoResponse;
use tour_engine::error::AppError;

#[test]
fn test_business_rejections_are_not_faults() {
    for err in [
        AppError::NotEntitled("t1".to_string()),
        AppError::NoPosition,
        AppError::IncompleteTour {
            completed: 2,
            total: 3,
        },
        AppError::InvalidState("done".to_string()),
        AppError::TourNotPurchasable("t1".to_string()),
    ] {
        assert!(err.is_business_rejection(), "{:?}", err);
    }

    assert!(!AppError::Database("down".to_string()).is_business_rejection());
    assert!(!AppError::Internal(anyhow::anyhow!("boom")).is_business_rejection());
}

#[test]
fn test_status_codes() {
    let cases = [
        (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
        (
            AppError::Validation("x".to_string()),
            StatusCode::BAD_REQUEST,
        ),
        (AppError::NotFound("x".to_string()), StatusCode::NOT_FOUND),
        (AppError::NotEntitled("x".to_string()), StatusCode::FORBIDDEN),
        (AppError::NoPosition, StatusCode::UNPROCESSABLE_ENTITY),
        (AppError::InvalidState("x".to_string()), StatusCode::CONFLICT),
        (
            AppError::Database("x".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (err, expected) in cases {
        assert_eq!(err.into_response().status(), expected);
    }
}

#[test]
fn test_incomplete_tour_message_has_counts() {
    let err = AppError::IncompleteTour {
        completed: 2,
        total: 3,
    };
    assert_eq!(err.code(), "incomplete_tour");
    assert!(err.to_string().contains("2 of 3"));
}
