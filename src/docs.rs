use crate::api::college::{CollegeDetail, CreateCollege, CreatePoc};
use crate::api::employee::CreateEmployee;
use crate::api::leave_request::{CreateLeave, LeaveList, LeaveStatusReq};
use crate::model::attendance::Attendance;
use crate::model::college::{College, Poc};
use crate::model::leave_request::{LeaveRequest, LeaveStatus};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CRM API",
        version = "1.0.0",
        description = r#"
## Training CRM

Back office for a training company: the colleges it sells to, the plans and
proposals it sends them, the trainers it allocates, and the staff who run it.

### Key Features
- **Colleges & POCs**: college registry with points of contact
- **Services, Plans & Proposals**: catalogue, proposal lifecycle, files, trainer allocation and mail
- **Trainers**: profiles, services, bank details and reviews
- **Employees**: profiles, bank details, attendance, leave and reimbursements
- **Exams**: categories and college mappings
- **Documents**: .docx generation from templates
- **Zip ingestion**: PAN-to-email resolution for archived files

### Security
Every endpoint except sign-in requires a **JWT Bearer** token.
Page access is granted per (vertical, position) role.

### Response Format
Every JSON response is wrapped as `{ "status": bool, "message": string, "data": ... }`.
"#,
    ),
    paths(
        crate::auth::handlers::check_access,

        crate::api::college::add_college,
        crate::api::college::list_colleges,
        crate::api::college::get_college,
        crate::api::college::delete_college,

        crate::api::employee::create_employee,
        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,

        crate::api::attendance::check_in,
        crate::api::attendance::lunch_in,
        crate::api::attendance::lunch_out,
        crate::api::attendance::check_out,
        crate::api::attendance::today,
        crate::api::attendance::list_attendance,
        crate::api::attendance::update_attendance,

        crate::api::leave_request::create_leave,
        crate::api::leave_request::update_leave_status,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::leave_list,
        crate::api::leave_request::delete_leave
    ),
    components(
        schemas(
            College,
            Poc,
            CreateCollege,
            CreatePoc,
            CollegeDetail,
            CreateEmployee,
            Attendance,
            LeaveRequest,
            LeaveStatus,
            CreateLeave,
            LeaveStatusReq,
            LeaveList
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Authentication and page access"),
        (name = "College", description = "College and POC management APIs"),
        (name = "Employee", description = "Employee management APIs"),
        (name = "Attendance", description = "Attendance management APIs"),
        (name = "Leave", description = "Leave management APIs"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by the secured paths.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
