use crate::{
    api::{
        access, attendance, catalog, college, document, employee, exam, leave_request, mail,
        proposal, reimbursement, trainer, zip_upload,
    },
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

/// Replenish period for a per-minute quota, never below 1 ms.
fn replenish_ms(requests_per_min: u32) -> u64 {
    (60_000 / requests_per_min.max(1) as u64).max(1)
}

// Per-route limiter; a zero quota is clamped to one request per minute.
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(replenish_ms(requests_per_min))
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .expect("non-zero governor quota");
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let signin_limiter = Arc::new(build_limiter(config.rate_signin_per_min));
    let signup_limiter = Arc::new(build_limiter(config.rate_signup_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    let prefix = config.api_prefix.trim_end_matches('/');

    // Public route. A plain resource, so the rest of /auth falls through to
    // the protected scope below.
    cfg.service(
        web::resource(format!("{prefix}/auth/signin"))
            .wrap(signin_limiter)
            .route(web::post().to(handlers::signin)),
    );

    // Protected routes
    cfg.service(
        web::scope(prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(protected_limiter)
            .service(
                web::scope("/auth")
                    .service(
                        web::resource("/signup")
                            .wrap(signup_limiter)
                            .route(web::post().to(handlers::signup)),
                    )
                    .route("/me", web::get().to(handlers::me))
                    .route("/pages", web::get().to(handlers::my_pages))
                    .route("/access/{component}", web::get().to(handlers::check_access)),
            )
            .service(
                web::scope("/access")
                    .service(
                        web::resource("/verticals")
                            .route(web::post().to(access::add_vertical))
                            .route(web::get().to(access::list_verticals)),
                    )
                    .route("/verticals/{id}", web::delete().to(access::delete_vertical))
                    .service(
                        web::resource("/positions")
                            .route(web::post().to(access::add_position))
                            .route(web::get().to(access::list_positions)),
                    )
                    .route("/positions/{id}", web::delete().to(access::delete_position))
                    .service(
                        web::resource("/pages")
                            .route(web::post().to(access::add_page))
                            .route(web::get().to(access::list_pages)),
                    )
                    .route("/pages/{id}", web::delete().to(access::delete_page))
                    .service(
                        web::resource("/roles")
                            .route(web::post().to(access::grant_access))
                            .route(web::get().to(access::list_access)),
                    )
                    .route("/roles/{id}", web::delete().to(access::revoke_access)),
            )
            .service(
                web::scope("/colleges")
                    // /colleges
                    .service(
                        web::resource("")
                            .route(web::post().to(college::add_college))
                            .route(web::get().to(college::list_colleges)),
                    )
                    // /colleges/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(college::get_college))
                            .route(web::put().to(college::update_college))
                            .route(web::delete().to(college::delete_college)),
                    )
                    // /colleges/{id}/pocs
                    .service(
                        web::resource("/{id}/pocs")
                            .route(web::post().to(college::add_poc))
                            .route(web::get().to(college::list_pocs)),
                    )
                    .route("/{id}/exams", web::get().to(exam::list_college_exams)),
            )
            .service(
                web::resource("/pocs/{id}")
                    .route(web::put().to(college::update_poc))
                    .route(web::delete().to(college::delete_poc)),
            )
            .service(
                web::scope("/services")
                    .service(
                        web::resource("")
                            .route(web::post().to(catalog::add_service))
                            .route(web::get().to(catalog::list_services)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(catalog::update_service))
                            .route(web::delete().to(catalog::delete_service)),
                    ),
            )
            .service(
                web::scope("/plans")
                    .service(
                        web::resource("")
                            .route(web::post().to(catalog::add_plan))
                            .route(web::get().to(catalog::list_plans)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(catalog::get_plan))
                            .route(web::put().to(catalog::update_plan))
                            .route(web::delete().to(catalog::delete_plan)),
                    ),
            )
            .service(
                web::scope("/proposals")
                    // /proposals
                    .service(
                        web::resource("")
                            .route(web::post().to(proposal::add_proposal))
                            .route(web::get().to(proposal::list_proposals)),
                    )
                    // /proposals/college/{code}
                    .route(
                        "/college/{code}",
                        web::get().to(proposal::list_college_proposals),
                    )
                    // /proposals/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(proposal::get_proposal))
                            .route(web::put().to(proposal::update_proposal))
                            .route(web::delete().to(proposal::delete_proposal)),
                    )
                    .route("/{id}/status", web::put().to(proposal::update_status))
                    // /proposals/{id}/files
                    .service(
                        web::resource("/{id}/files")
                            .route(web::post().to(proposal::add_file))
                            .route(web::get().to(proposal::list_files)),
                    )
                    .route("/{id}/files/{file_id}", web::delete().to(proposal::delete_file))
                    // /proposals/{id}/trainers
                    .service(
                        web::resource("/{id}/trainers")
                            .route(web::post().to(proposal::allocate_trainer))
                            .route(web::get().to(proposal::list_allocations)),
                    )
                    .route(
                        "/{id}/trainers/{trainer_id}",
                        web::delete().to(proposal::deallocate_trainer),
                    )
                    .route("/{id}/mail", web::post().to(proposal::send_proposal_mail)),
            )
            .service(
                web::scope("/trainers")
                    .service(
                        web::resource("")
                            .route(web::post().to(trainer::add_trainer))
                            .route(web::get().to(trainer::list_trainers)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(trainer::get_trainer))
                            .route(web::put().to(trainer::update_trainer))
                            .route(web::delete().to(trainer::delete_trainer)),
                    )
                    .route("/{id}/services", web::put().to(trainer::set_services))
                    .service(
                        web::resource("/{id}/bank-details")
                            .route(web::post().to(trainer::add_bank_detail))
                            .route(web::get().to(trainer::list_bank_details)),
                    )
                    .service(
                        web::resource("/{id}/bank-details/{bank_id}")
                            .route(web::put().to(trainer::update_bank_detail))
                            .route(web::delete().to(trainer::delete_bank_detail)),
                    )
                    .service(
                        web::resource("/{id}/reviews")
                            .route(web::post().to(trainer::add_review))
                            .route(web::get().to(trainer::list_reviews)),
                    ),
            )
            .service(
                web::scope("/employees")
                    // /employees
                    .service(
                        web::resource("")
                            .route(web::post().to(employee::create_employee))
                            .route(web::get().to(employee::list_employees)),
                    )
                    // /employees/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(employee::update_employee))
                            .route(web::get().to(employee::get_employee))
                            .route(web::delete().to(employee::delete_employee)),
                    )
                    .service(
                        web::resource("/{id}/bank-details")
                            .route(web::post().to(employee::add_bank_detail))
                            .route(web::get().to(employee::list_bank_details)),
                    )
                    .service(
                        web::resource("/{id}/bank-details/{bank_id}")
                            .route(web::put().to(employee::update_bank_detail))
                            .route(web::delete().to(employee::delete_bank_detail)),
                    ),
            )
            .service(
                web::scope("/reimbursements")
                    .service(
                        web::resource("")
                            .route(web::post().to(reimbursement::create_reimbursement))
                            .route(web::get().to(reimbursement::list_reimbursements)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(reimbursement::get_reimbursement))
                            .route(web::delete().to(reimbursement::delete_reimbursement)),
                    )
                    .route("/{id}/status", web::put().to(reimbursement::update_status))
                    .route(
                        "/{id}/expenditures",
                        web::post().to(reimbursement::add_expenditure),
                    )
                    .route(
                        "/{id}/expenditures/{expenditure_id}",
                        web::delete().to(reimbursement::delete_expenditure),
                    )
                    .service(
                        web::resource("/{id}/reviews")
                            .route(web::post().to(reimbursement::add_review))
                            .route(web::get().to(reimbursement::list_reviews)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    // literal segments first, /{id} last
                    .route("", web::get().to(attendance::list_attendance))
                    .route("/check-in", web::post().to(attendance::check_in))
                    .route("/lunch-in", web::post().to(attendance::lunch_in))
                    .route("/lunch-out", web::post().to(attendance::lunch_out))
                    .route("/check-out", web::post().to(attendance::check_out))
                    .route("/today", web::get().to(attendance::today))
                    .route("/{id}", web::put().to(attendance::update_attendance)),
            )
            .service(
                web::scope("/leave")
                    // /leave
                    .service(
                        web::resource("")
                            .route(web::get().to(leave_request::leave_list))
                            .route(web::post().to(leave_request::create_leave)),
                    )
                    // /leave/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(leave_request::get_leave))
                            .route(web::delete().to(leave_request::delete_leave)),
                    )
                    // /leave/{id}/status
                    .route(
                        "/{id}/status",
                        web::put().to(leave_request::update_leave_status),
                    ),
            )
            .service(
                web::scope("/exams")
                    .service(
                        web::resource("/categories")
                            .route(web::post().to(exam::add_category))
                            .route(web::get().to(exam::list_categories)),
                    )
                    .route("/categories/{id}", web::delete().to(exam::delete_category))
                    .service(
                        web::resource("")
                            .route(web::post().to(exam::add_exam))
                            .route(web::get().to(exam::list_exams)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(exam::get_exam))
                            .route(web::put().to(exam::update_exam))
                            .route(web::delete().to(exam::delete_exam)),
                    )
                    .service(
                        web::resource("/{id}/colleges")
                            .route(web::post().to(exam::map_college))
                            .route(web::get().to(exam::list_exam_colleges)),
                    )
                    .route(
                        "/{id}/colleges/{mapping_id}",
                        web::delete().to(exam::unmap_college),
                    ),
            )
            .route("/documents/{kind}", web::post().to(document::generate_document))
            .route("/mail/send", web::post().to(mail::send_mail))
            .route("/zip/upload", web::post().to(zip_upload::upload_zip)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode};
    use actix_web::test::{TestRequest, call_service, init_service};

    #[actix_web::test]
    async fn protected_routes_require_a_token() {
        let config = Config::for_tests();
        let app = init_service(
            App::new()
                .app_data(web::Data::new(config.clone()))
                .configure(|cfg| configure(cfg, config.clone())),
        )
        .await;

        for uri in ["/api/auth/me", "/api/colleges", "/api/attendance/today", "/api/exams"] {
            let req = TestRequest::get()
                .uri(uri)
                .peer_addr("127.0.0.1:4000".parse().unwrap())
                .to_request();
            let resp = call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[actix_web::test]
    async fn account_creation_is_not_public() {
        let config = Config::for_tests();
        let app = init_service(
            App::new()
                .app_data(web::Data::new(config.clone()))
                .configure(|cfg| configure(cfg, config.clone())),
        )
        .await;

        let req = TestRequest::post()
            .uri("/api/auth/signup")
            .peer_addr("127.0.0.1:4000".parse().unwrap())
            .set_json(serde_json::json!({
                "email": "intruder@example.com",
                "password": "pw",
                "vertical_id": 1,
                "position_id": 1,
                "employee_id": 1
            }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn zero_quota_still_builds_a_limiter() {
        let _ = build_limiter(0);
    }

    #[test]
    fn high_quota_keeps_a_positive_period() {
        assert_eq!(replenish_ms(60), 1_000);
        assert_eq!(replenish_ms(60_000), 1);
        assert_eq!(replenish_ms(120_000), 1);
        let _ = build_limiter(120_000);
    }
}
