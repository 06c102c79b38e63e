//! Localized user-facing message catalog.
//!
//! Messages are keyed strings with Persian and English renditions. Lookup
//! falls back to English for unknown languages, and unknown keys echo the
//! key itself so a missing entry is visible instead of silent.

/// Returns the message for `key` in `language` ("fa" or "en").
#[must_use]
pub fn get_message(key: &str, language: &str) -> String {
    let Some((en, fa)) = catalog(key) else {
        return key.to_string();
    };
    match language {
        "fa" => fa.to_string(),
        _ => en.to_string(),
    }
}

/// Like [`get_message`], substituting `{name}` placeholders from `vars`.
#[must_use]
pub fn get_message_with(key: &str, language: &str, vars: &[(&str, &str)]) -> String {
    let mut message = get_message(key, language);
    for (name, value) in vars {
        message = message.replace(&format!("{{{name}}}"), value);
    }
    message
}

#[allow(clippy::too_many_lines)]
fn catalog(key: &str) -> Option<(&'static str, &'static str)> {
    let entry = match key {
        "phone.invalid" => (
            "Invalid phone number",
            "شماره تلفن نامعتبر است",
        ),
        "otp.sent" => (
            "Verification code sent",
            "کد تایید ارسال شد",
        ),
        "otp.expired" => (
            "Verification code expired, request a new one",
            "کد تایید منقضی شده است، لطفا دوباره درخواست دهید",
        ),
        "otp.invalid.with_attempts" => (
            "Invalid verification code, {remaining} attempts remaining",
            "کد تایید نادرست است، {remaining} تلاش باقی مانده است",
        ),
        "otp.too_many_attempts" => (
            "Too many failed attempts, try again later",
            "تعداد تلاش‌های ناموفق بیش از حد مجاز است، بعدا تلاش کنید",
        ),
        "otp.blocked" => (
            "Temporarily blocked due to repeated attempts",
            "به دلیل تلاش‌های مکرر موقتا مسدود شده‌اید",
        ),
        "otp.rate_limited.minute" => (
            "Too many requests, wait a minute",
            "درخواست‌های زیاد، یک دقیقه صبر کنید",
        ),
        "otp.rate_limited.ten_minutes" => (
            "Too many requests, wait ten minutes",
            "درخواست‌های زیاد، ده دقیقه صبر کنید",
        ),
        "otp.rate_limited.hour" => (
            "Too many requests, wait an hour",
            "درخواست‌های زیاد، یک ساعت صبر کنید",
        ),
        "token.invalid" => (
            "Invalid token",
            "توکن نامعتبر است",
        ),
        "token.expired" => (
            "Token expired",
            "توکن منقضی شده است",
        ),
        "token.revoked" => (
            "Token has been revoked",
            "توکن باطل شده است",
        ),
        "token.reused" => (
            "Session terminated for security reasons, sign in again",
            "نشست شما به دلایل امنیتی خاتمه یافت، دوباره وارد شوید",
        ),
        "account.not_active" => (
            "Account is not active",
            "حساب کاربری فعال نیست",
        ),
        "auth.login.invalid" => (
            "Invalid credentials",
            "نام کاربری یا رمز عبور نادرست است",
        ),
        "auth.login.no_password" => (
            "No password is set for this account",
            "برای این حساب رمز عبور تنظیم نشده است",
        ),
        "auth.login.not_active" => (
            "Account is not active",
            "حساب کاربری فعال نیست",
        ),
        "auth.login.too_many_attempts" => (
            "Too many login attempts, try again later",
            "تلاش‌های ورود بیش از حد مجاز است، بعدا تلاش کنید",
        ),
        "profile.not_eligible" => (
            "Profile completion is not available for this account",
            "تکمیل پروفایل برای این حساب مجاز نیست",
        ),
        "profile.missing_fields" => (
            "Required fields are missing: {fields}",
            "فیلدهای الزامی وارد نشده است: {fields}",
        ),
        "profile.forbidden_fields" => (
            "Submitted fields are not allowed for this role",
            "فیلدهای ارسالی برای این نقش مجاز نیست",
        ),
        "profile.invalid_categories" => (
            "Unknown business categories: {ids}",
            "دسته‌بندی‌های نامعتبر: {ids}",
        ),
        "profile.completed" => (
            "Profile completed",
            "پروفایل با موفقیت تکمیل شد",
        ),
        "profile.pending_review" => (
            "Profile submitted and awaiting review",
            "پروفایل شما ثبت شد و در انتظار بررسی است",
        ),
        "vendor.not_eligible" => (
            "Business name is required",
            "نام کسب‌وکار الزامی است",
        ),
        "admin.forbidden" => (
            "Access denied",
            "دسترسی مجاز نیست",
        ),
        "admin.invalid_vendor_id" => (
            "Invalid vendor id",
            "شناسه فروشنده نامعتبر است",
        ),
        "admin.vendor.not_pending" => (
            "No pending vendor found",
            "فروشنده در انتظار بررسی یافت نشد",
        ),
        "admin.rate_limited" => (
            "Too many reviews, try again later",
            "تعداد بررسی‌ها بیش از حد مجاز است، بعدا تلاش کنید",
        ),
        "admin.vendor.approved" => (
            "Vendor approved",
            "فروشنده تایید شد",
        ),
        "admin.vendor.rejected" => (
            "Vendor rejected",
            "فروشنده رد شد",
        ),
        "session.none" => (
            "No active session found",
            "نشست فعالی یافت نشد",
        ),
        "account.deletion.requested" => (
            "Account deletion requested",
            "درخواست حذف حساب ثبت شد",
        ),
        "server.error" => (
            "Internal server error",
            "خطای داخلی سرور",
        ),
        _ => return None,
    };
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::{get_message, get_message_with};

    #[test]
    fn persian_and_english_differ() {
        assert_ne!(get_message("otp.sent", "fa"), get_message("otp.sent", "en"));
    }

    #[test]
    fn unknown_language_falls_back_to_english() {
        assert_eq!(get_message("otp.sent", "de"), get_message("otp.sent", "en"));
    }

    #[test]
    fn unknown_key_echoes_key() {
        assert_eq!(get_message("no.such.key", "en"), "no.such.key");
    }

    #[test]
    fn placeholders_are_substituted() {
        let message = get_message_with("otp.invalid.with_attempts", "en", &[("remaining", "3")]);
        assert!(message.contains('3'), "got: {message}");
        assert!(!message.contains("{remaining}"));
    }

    #[test]
    fn multiple_placeholders() {
        let message = get_message_with(
            "profile.invalid_categories",
            "en",
            &[("ids", "a1, b2")],
        );
        assert!(message.contains("a1, b2"));
    }
}
