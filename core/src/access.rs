use crate::context::TutoringContext;
use crate::error::codes;
use crate::request::{Action, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("This action requires a verified account.")]
    VerificationRequired,
    #[error("This action requires a verified teacher license.")]
    TeacherLicenseRequired,
}

impl AccessDenied {
    pub fn code(self) -> &'static str {
        match self {
            AccessDenied::VerificationRequired => codes::VERIFICATION_REQUIRED,
            AccessDenied::TeacherLicenseRequired => codes::TEACHER_LICENSE_REQUIRED,
        }
    }

    pub fn docs_hint(self) -> &'static str {
        match self {
            AccessDenied::VerificationRequired => {
                "Sign in and verify your account, then resend the request."
            }
            AccessDenied::TeacherLicenseRequired => {
                "Lessons, worksheets, assessments and slides are available to licensed teachers."
            }
        }
    }
}

/// Role, verification and license gating.
///
/// Evaluated on the effective action, so an intent override cannot be used
/// to reach a privileged mode, and before any provider call.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessPolicy;

impl AccessPolicy {
    pub fn authorize(&self, ctx: &TutoringContext) -> Result<(), AccessDenied> {
        self.check(
            ctx.role,
            ctx.effective_action,
            ctx.auth.verified,
            ctx.auth.teacher_licensed,
        )
    }

    pub fn check(
        &self,
        role: Role,
        action: Action,
        verified: bool,
        teacher_licensed: bool,
    ) -> Result<(), AccessDenied> {
        if role == Role::Educator && !verified {
            return Err(AccessDenied::VerificationRequired);
        }
        if action.is_privileged() {
            if !verified {
                return Err(AccessDenied::VerificationRequired);
            }
            if !teacher_licensed {
                return Err(AccessDenied::TeacherLicenseRequired);
            }
        }
        Ok(())
    }
}
