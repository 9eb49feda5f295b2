use std::task::{Context, Poll};

use chrono::Utc;
use tower::Service;
use uuid::Uuid;

use crate::{
    domain::{Caller, DueStatus, Payment, PaymentStatus, PaymentTarget},
    ports::{database::DatabasePort, member::MemberPort},
};

use super::{require_admin, validate_amount, CommandFuture, DomainLogic, Error};

/// Declare a payment for one due or one fine
///
/// The payment stays pending until an admin confirms it.
pub struct CreatePaymentRequest {
    pub caller: Caller,
    pub member_id: Uuid,
    pub target: PaymentTarget,
    pub amount_cents: i64,
    /// Reference to the uploaded proof, from the file storage collaborator
    pub proof_url: Option<String>,
}

impl<D, M> Service<CreatePaymentRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Payment;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CreatePaymentRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            if !req.caller.can_act_for(req.member_id) {
                tracing::warn!(
                    caller = %req.caller.member_id,
                    member_id = %req.member_id,
                    "rejected payment on behalf of another member"
                );
                return Err(Error::Forbidden(
                    req.caller.member_id,
                    "file payments for another member",
                ));
            }
            validate_amount(req.amount_cents)?;

            // The target must be an open charge of this member
            let (owner, settled) = match req.target {
                PaymentTarget::Due(due_id) => {
                    let due = database.get_due(due_id).await?;
                    (due.member_id, due.status != DueStatus::Pending)
                }
                PaymentTarget::Fine(fine_id) => {
                    let fine = database.get_fine(fine_id).await?;
                    (fine.member_id, fine.paid)
                }
            };
            if owner != req.member_id {
                return Err(Error::Validation(
                    format!("{:?} does not belong to member {}", req.target, req.member_id).into(),
                ));
            }
            if settled {
                return Err(Error::Conflict(
                    format!("{:?} is settled already", req.target).into(),
                ));
            }
            let pending = database.list_payments(Some(PaymentStatus::Pending)).await?;
            if pending.iter().any(|p| p.target == req.target) {
                return Err(Error::Conflict(
                    format!("{:?} already has a payment awaiting confirmation", req.target).into(),
                ));
            }

            let payment = database
                .insert_payment(Payment {
                    payment_id: Uuid::new_v4(),
                    member_id: req.member_id,
                    target: req.target,
                    amount_cents: req.amount_cents,
                    status: PaymentStatus::Pending,
                    proof_url: req.proof_url,
                    created_at: Utc::now(),
                    confirmed_by: None,
                    confirmed_at: None,
                })
                .await?;

            tracing::info!(
                payment_id = %payment.payment_id,
                member_id = %payment.member_id,
                amount_cents = payment.amount_cents,
                "payment created"
            );
            Ok(payment)
        })
    }
}

pub struct ConfirmPaymentRequest {
    pub caller: Caller,
    pub payment_id: Uuid,
}

impl<D, M> Service<ConfirmPaymentRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Payment;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConfirmPaymentRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            require_admin(&req.caller, "confirm payments")?;

            let payment = database.get_payment(req.payment_id).await?;
            if payment.status != PaymentStatus::Pending {
                return Err(Error::Conflict(
                    format!("payment {} is confirmed already", payment.payment_id).into(),
                ));
            }

            let entry = payment.cash_entry(req.caller.member_id);
            let payment = database
                .confirm_payment(payment.payment_id, req.caller.member_id, entry)
                .await?;

            tracing::info!(
                payment_id = %payment.payment_id,
                member_id = %payment.member_id,
                amount_cents = payment.amount_cents,
                "payment confirmed"
            );
            Ok(payment)
        })
    }
}

/// Payments awaiting confirmation, oldest first
pub struct PendingPaymentsRequest {
    pub caller: Caller,
}

impl<D, M> Service<PendingPaymentsRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Vec<Payment>;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: PendingPaymentsRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            require_admin(&req.caller, "list pending payments")?;

            let mut payments = database.list_payments(Some(PaymentStatus::Pending)).await?;
            payments.sort_by_key(|p| p.created_at);
            Ok(payments)
        })
    }
}
